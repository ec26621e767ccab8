//! Input mode handling for the TUI.
//!
//! Tracks whether keys drive playback directly or are typed into the slash
//! command line.


/// Current input mode of the application.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum InputMode {
    /// Keyboard shortcuts active.
    #[default]
    Normal,

    /// Typing a slash command.
    Command,
}


/// Single-line text buffer with a cursor.
#[derive( Debug, Default )]
pub struct InputBuffer {
    content: String,
    /// Byte offset, always on a char boundary
    cursor: usize,
}


impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }


    /// Inserts a character at the cursor position.
    pub fn insert( &mut self, c: char ) {
        self.content.insert( self.cursor, c );
        self.cursor += c.len_utf8();
    }


    /// Deletes the character before the cursor.
    pub fn backspace( &mut self ) {
        if let Some( prev ) = self.prev_boundary() {
            self.content.remove( prev );
            self.cursor = prev;
        }
    }


    /// Deletes the character at the cursor position.
    pub fn delete( &mut self ) {
        if self.cursor < self.content.len() {
            self.content.remove( self.cursor );
        }
    }


    pub fn clear( &mut self ) {
        self.content.clear();
        self.cursor = 0;
    }


    /// Returns the content and empties the buffer.
    pub fn take( &mut self ) -> String {
        self.cursor = 0;
        std::mem::take( &mut self.content )
    }


    pub fn content( &self ) -> &str {
        &self.content
    }


    /// Cursor position in characters, for display.
    pub fn cursor_char_pos( &self ) -> usize {
        self.content[ ..self.cursor ].chars().count()
    }


    fn prev_boundary( &self ) -> Option<usize> {
        self.content[ ..self.cursor ].char_indices().last().map( |( i, _ )| i )
    }


    pub fn move_left( &mut self ) {
        if let Some( prev ) = self.prev_boundary() {
            self.cursor = prev;
        }
    }


    pub fn move_right( &mut self ) {
        if let Some( c ) = self.content[ self.cursor.. ].chars().next() {
            self.cursor += c.len_utf8();
        }
    }


    pub fn move_home( &mut self ) {
        self.cursor = 0;
    }


    pub fn move_end( &mut self ) {
        self.cursor = self.content.len();
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn typed( text: &str ) -> InputBuffer {
        let mut buf = InputBuffer::new();
        text.chars().for_each( |c| buf.insert( c ) );
        buf
    }


    #[test]
    fn test_insert_in_middle() {
        let mut buf = typed( "ad" );
        buf.move_left();
        buf.insert( 'd' );
        assert_eq!( buf.content(), "add" );
        assert_eq!( buf.cursor_char_pos(), 2 );
    }


    #[test]
    fn test_editing_multibyte_text() {
        let mut buf = typed( "new café" );
        buf.backspace();
        assert_eq!( buf.content(), "new caf" );

        buf.insert( 'é' );
        buf.move_left();
        buf.move_left();
        buf.delete();
        assert_eq!( buf.content(), "new caé" );
        buf.move_right();
        assert_eq!( buf.cursor_char_pos(), 7 );
    }


    #[test]
    fn test_home_end_and_edges() {
        let mut buf = typed( "vol" );
        buf.move_home();
        buf.backspace();
        buf.move_left();
        assert_eq!( buf.cursor_char_pos(), 0 );

        buf.move_end();
        buf.delete();
        buf.move_right();
        assert_eq!( buf.content(), "vol" );
        assert_eq!( buf.cursor_char_pos(), 3 );
    }


    #[test]
    fn test_take_resets() {
        let mut buf = typed( "next" );
        assert_eq!( buf.take(), "next" );
        assert_eq!( buf.content(), "" );
        assert_eq!( buf.cursor_char_pos(), 0 );
    }
}
