use crate::acquisition::sample::{SampleBlock, SourceSettings};
use crate::prelude::DeviceError;

/// Receiver abstraction. The source owns its device handle from `open` until
/// `close`; nothing else in the process touches it.
pub trait SampleSource: Send {
    /// Opens and configures the underlying device.
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Blocks until a full block is available.
    fn acquire(&mut self) -> Result<SampleBlock, DeviceError>;

    /// Releases the device. Must be safe to call more than once.
    fn close(&mut self);

    /// Tuning in effect for every block this source yields.
    fn settings(&self) -> &SourceSettings;

    fn describe(&self) -> String {
        let settings = self.settings();
        format!(
            "{:.3} MHz @ {:.3} MS/s, gain {}",
            settings.center_freq_hz / 1e6,
            settings.sample_rate_hz / 1e6,
            settings.gain
        )
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn open(&mut self) -> Result<(), DeviceError> {
        (**self).open()
    }

    fn acquire(&mut self) -> Result<SampleBlock, DeviceError> {
        (**self).acquire()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn settings(&self) -> &SourceSettings {
        (**self).settings()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
