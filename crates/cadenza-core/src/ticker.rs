//! Periodic playback reconciliation
//!
//! The front end awaits [`Ticker::tick`] in its event loop and calls
//! [`crate::PlaybackController::tick`] on each firing.

use std::time::Duration;

use tokio::time::{ self, Instant, Interval, MissedTickBehavior };


/// Interval between position reconciliations.
pub const TICK_PERIOD: Duration = Duration::from_secs( 1 );


/// Fixed-period timer. Ticks missed while the loop was busy are dropped
/// rather than fired in a burst.
pub struct Ticker {
    interval: Interval,
}


impl Ticker {
    /// Creates a ticker whose first tick fires one `period` from now.
    pub fn new( period: Duration ) -> Self {
        let mut interval = time::interval_at( Instant::now() + period, period );
        interval.set_missed_tick_behavior( MissedTickBehavior::Skip );
        Self { interval }
    }


    /// Waits for the next tick.
    pub async fn tick( &mut self ) {
        self.interval.tick().await;
    }


    pub fn period( &self ) -> Duration {
        self.interval.period()
    }
}


impl Default for Ticker {
    fn default() -> Self {
        Self::new( TICK_PERIOD )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[tokio::test( start_paused = true )]
    async fn test_first_tick_waits_one_period() {
        let start = Instant::now();
        let mut ticker = Ticker::default();
        assert_eq!( ticker.period(), TICK_PERIOD );

        ticker.tick().await;

        assert_eq!( start.elapsed(), TICK_PERIOD );
    }


    #[tokio::test( start_paused = true )]
    async fn test_missed_ticks_are_skipped() {
        let start = Instant::now();
        let mut ticker = Ticker::new( Duration::from_millis( 100 ) );

        time::sleep( Duration::from_millis( 350 ) ).await;
        ticker.tick().await;
        ticker.tick().await;

        // One late tick, then back on the 100ms grid
        assert_eq!( start.elapsed(), Duration::from_millis( 400 ) );
    }
}
