//! Logical channels shared by one relay output and one sensor input
//!
//! Channels are numbered 1 to 8. Pins and topics are looked up by channel
//! number directly, see [`crate::gpio::BoardLayout`] and [`map::ChannelMap`].

pub mod map;

pub use map::ChannelMap;

use std::fmt;

pub const CHANNEL_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(u8);

impl Channel {
    /// Returns `None` outside 1..=8
    pub fn new(number: u8) -> Option<Self> {
        if (1..=CHANNEL_COUNT as u8).contains(&number) {
            Some(Self(number))
        } else {
            None
        }
    }

    /// Channel for a zero-based list position
    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index + 1).ok().and_then(Self::new)
    }

    /// Channels 1..=8 in ascending order
    pub fn all() -> impl Iterator<Item = Channel> {
        (1..=CHANNEL_COUNT as u8).map(Channel)
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}", self.0)
    }
}
