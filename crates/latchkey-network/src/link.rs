//! Network link (the layer below the broker session).
//!
//! On the device this is the Wi-Fi association; on a host the operating
//! system owns the link, so [`SystemLink`] always reports it up.

#![allow(async_fn_in_trait)]

pub trait NetworkLink: Send {
    fn is_up(&self) -> bool;

    /// Try to bring the link back. Returns `true` if it is up afterwards.
    async fn reconnect(&mut self) -> bool;
}

/// Link managed by the host operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLink;

impl NetworkLink for SystemLink {
    fn is_up(&self) -> bool {
        true
    }

    async fn reconnect(&mut self) -> bool {
        true
    }
}
