//! Decoded video frame handles.
//!
//! A decoded frame stands in for a native decoder surface. It is owned by
//! exactly one holder at a time and its resource is released exactly once:
//! either by an explicit [`DecodedVideoFrame::close`] or when the handle is
//! dropped. Collections that store frames therefore release on every removal
//! path simply by letting the handle go.

use std::fmt;

/// Called once with the frame timestamp when the native resource is freed.
pub type ReleaseHook = Box<dyn FnOnce(i64) + Send>;

/// An owned decoded video frame.
pub struct DecodedVideoFrame {
    timestamp_us: i64,
    duration_us: Option<i64>,
    display_width: u32,
    display_height: u32,
    pixels: Option<Vec<u8>>,
    release_hook: Option<ReleaseHook>,
}

impl DecodedVideoFrame {
    /// Wrap decoded pixel data.
    pub fn new(timestamp_us: i64, pixels: Vec<u8>, display_width: u32, display_height: u32) -> Self {
        Self {
            timestamp_us,
            duration_us: None,
            display_width,
            display_height,
            pixels: Some(pixels),
            release_hook: None,
        }
    }

    /// Attach a hook that observes the release of this frame's resource.
    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.release_hook = Some(hook);
        self
    }

    /// Attach a presentation duration.
    pub fn with_duration_us(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    pub fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    pub fn display_width(&self) -> u32 {
        self.display_width
    }

    pub fn display_height(&self) -> u32 {
        self.display_height
    }

    /// Pixel data; empty once the frame has been released.
    pub fn pixels(&self) -> &[u8] {
        self.pixels.as_deref().unwrap_or(&[])
    }

    /// Bytes held by this frame.
    pub fn byte_size(&self) -> usize {
        self.pixels().len()
    }

    pub fn is_closed(&self) -> bool {
        self.pixels.is_none()
    }

    /// Release the native resource now.
    pub fn close(mut self) {
        self.release();
    }

    /// Produce an independent frame with its own pixel storage.
    ///
    /// The copy shares no state with `self`: releasing either one does not
    /// affect the other, and the copy carries no release hook. Returns `None`
    /// if this frame was already released.
    pub fn try_clone(&self) -> Option<Self> {
        let pixels = self.pixels.as_ref()?.clone();
        Some(Self {
            timestamp_us: self.timestamp_us,
            duration_us: self.duration_us,
            display_width: self.display_width,
            display_height: self.display_height,
            pixels: Some(pixels),
            release_hook: None,
        })
    }

    fn release(&mut self) {
        if self.pixels.take().is_some() {
            if let Some(hook) = self.release_hook.take() {
                hook(self.timestamp_us);
            }
        }
    }
}

impl Drop for DecodedVideoFrame {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for DecodedVideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedVideoFrame")
            .field("timestamp_us", &self.timestamp_us)
            .field("duration_us", &self.duration_us)
            .field("display_width", &self.display_width)
            .field("display_height", &self.display_height)
            .field("bytes", &self.byte_size())
            .field("closed", &self.is_closed())
            .finish()
    }
}
