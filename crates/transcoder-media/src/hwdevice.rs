//! HwDeviceRegistry and NetworkStack collaborators (`hw_device_free_all` /
//! `avformat_network_deinit`). No hardware device context is opened
//! anywhere in this port — decode and encode both stay on the software
//! path — so the registry side is a deliberate no-op kept only to satisfy
//! the cleanup ordering in `transcoder_core::cleanup::shutdown`.

use ffmpeg_the_third as ffmpeg;

use transcoder_core::collab::{HwDeviceRegistry, NetworkStack};

use crate::backend::MediaBackend;

impl HwDeviceRegistry for MediaBackend {
    fn free_all(&mut self) {}
}

impl NetworkStack for MediaBackend {
    fn deinit(&mut self) {
        unsafe { ffmpeg::ffi::avformat_network_deinit() };
    }
}
