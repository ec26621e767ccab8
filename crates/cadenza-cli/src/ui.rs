//! Rendering for the TUI.

use ratatui::{
    prelude::*,
    widgets::{ Block, Borders, Gauge, List, ListItem, Paragraph, Wrap },
};

use cadenza_core::{ command, track::Cover, AudioEngine, PlaybackState };

use crate::app::App;
use crate::input::InputMode;


/// Formats milliseconds as M:SS.
pub fn format_time( ms: u64 ) -> String {
    let secs = ms / 1000;
    format!( "{}:{:02}", secs / 60, secs % 60 )
}


/// Draws the main UI.
pub fn draw<E: AudioEngine>( frame: &mut Frame, app: &mut App<E> ) {
    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( 2 ),  // Header
            Constraint::Min( 0 ),     // Playlist or help
            Constraint::Length( 5 ),  // Now playing
            Constraint::Length( 1 ),  // Status bar
        ])
        .split( frame.area() );

    let header = Paragraph::new( format!( "  CADENZA - {}", app.controller.playlist().name() ) )
        .style( Style::default().fg( Color::Cyan ).bold() )
        .block( Block::default().borders( Borders::BOTTOM ) );
    frame.render_widget( header, chunks[0] );

    if app.show_help {
        draw_help( frame, chunks[1] );
    } else {
        draw_playlist( frame, app, chunks[1] );
    }
    draw_now_playing( frame, app, chunks[2] );
    draw_status_bar( frame, app, chunks[3] );
}


fn draw_playlist<E: AudioEngine>( frame: &mut Frame, app: &mut App<E>, area: Rect ) {
    let playlist = app.controller.playlist();
    let playing = match app.controller.state() {
        PlaybackState::Stopped => None,
        _ => Some( playlist.current_track_index() ),
    };

    let items: Vec<ListItem> = playlist
        .tracks()
        .iter()
        .enumerate()
        .map( |( i, path )| {
            let filename = path
                .file_name()
                .map( |n| n.to_string_lossy().into_owned() )
                .unwrap_or_else( || path.display().to_string() );
            let marker = if Some( i ) == playing { "▶" } else { " " };
            let item = ListItem::new( format!( "{} {:>3}. {}", marker, i + 1, filename ) );
            if i == playlist.current_track_index() {
                item.style( Style::default().fg( Color::Green ) )
            } else {
                item
            }
        })
        .collect();

    let title = format!( " {} ({}) ", playlist.name(), playlist.len() );
    let widget = List::new( items )
        .block( Block::default().title( title ).borders( Borders::ALL ) )
        .highlight_style( Style::default().bg( Color::DarkGray ) )
        .highlight_symbol( ">> " );

    frame.render_stateful_widget( widget, area, &mut app.playlist_state );
}


fn draw_help( frame: &mut Frame, area: Rect ) {
    let help = Paragraph::new( command::help_text() )
        .block( Block::default()
            .title( " Help (? or Esc to close) " )
            .borders( Borders::ALL )
        )
        .wrap( Wrap { trim: false } );

    frame.render_widget( help, area );
}


fn draw_now_playing<E: AudioEngine>( frame: &mut Frame, app: &App<E>, area: Rect ) {
    let block = Block::default().title( " Now Playing " ).borders( Borders::ALL );
    let inner = block.inner( area );
    frame.render_widget( block, area );

    let rows = Layout::default()
        .direction( Direction::Vertical )
        .constraints([ Constraint::Length( 1 ), Constraint::Length( 1 ), Constraint::Length( 1 ) ])
        .split( inner );

    let state_str = match app.controller.state() {
        PlaybackState::Playing => "▶",
        PlaybackState::Paused => "⏸",
        PlaybackState::Stopped => "■",
    };

    let ( title, details, length_ms ) = match app.controller.current_track() {
        Some( track ) => {
            let kbps = track.bitrate_bps / 1000;
            let mut details = if kbps > 0 {
                format!( "{}  ·  {} kbps", track.artist, kbps )
            } else {
                track.artist.clone()
            };
            if let Cover::Embedded( bytes ) = track.cover_image_or_placeholder() {
                details.push_str( &format!( "  ·  cover {} KiB", bytes.len().div_ceil( 1024 ) ) );
            }
            ( track.display_title(), details, ( track.length_seconds * 1000.0 ) as u64 )
        }
        None => ( "No track".to_string(), String::new(), 0 ),
    };

    frame.render_widget(
        Paragraph::new( Span::styled( format!( " {} {}", state_str, title ), Style::default().bold() ) ),
        rows[0],
    );
    frame.render_widget(
        Paragraph::new( Span::styled( format!( "   {}", details ), Style::default().fg( Color::Gray ) ) ),
        rows[1],
    );

    let duration = app.duration_ms.unwrap_or( length_ms );
    let position = app.position_ms;
    let ratio = if duration > 0 { ( position as f64 / duration as f64 ).clamp( 0.0, 1.0 ) } else { 0.0 };

    let gauge = Gauge::default()
        .gauge_style( Style::default().fg( Color::Cyan ).bg( Color::Black ) )
        .ratio( ratio )
        .label( format!(
            "{} / {}   vol {}%",
            format_time( position ),
            format_time( duration ),
            app.controller.volume()
        ));
    frame.render_widget( gauge, rows[2] );
}


fn draw_status_bar<E: AudioEngine>( frame: &mut Frame, app: &App<E>, area: Rect ) {
    let ( text, style ) = match app.input_mode {
        InputMode::Command => {
            ( format!( "/{}", app.input_buffer.content() ), Style::default().fg( Color::Yellow ) )
        }
        InputMode::Normal => match app.status_message {
            Some( ref msg ) => ( msg.clone(), Style::default().fg( Color::Green ) ),
            None => (
                " [/]Cmd [Enter]Play [Space]Pause [s]Stop [n/p]Skip [←/→]Seek [+/-]Vol [x]Remove [?]Help [q]Quit ".to_string(),
                Style::default().fg( Color::DarkGray ),
            ),
        },
    };

    frame.render_widget( Paragraph::new( text ).style( style ), area );

    if app.input_mode == InputMode::Command {
        let cursor_x = area.x + 1 + app.input_buffer.cursor_char_pos() as u16;
        frame.set_cursor_position(( cursor_x, area.y ));
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0 ), "0:00" );
        assert_eq!( format_time( 59_999 ), "0:59" );
        assert_eq!( format_time( 90_000 ), "1:30" );
        assert_eq!( format_time( 3_725_000 ), "62:05" );
    }
}
