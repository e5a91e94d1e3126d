//! RTL-SDR receiver. The device handle lives on a dedicated reader thread
//! and blocks are handed over through a bounded channel.

use log::{error, info, warn};
use rfspikecore::acquisition::{cu8_to_complex, Gain, SampleBlock, SampleSource, SourceSettings};
use rfspikecore::prelude::DeviceError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type BlockResult = Result<Vec<u8>, DeviceError>;

pub struct RtlSdrSource {
    device_index: u32,
    ppm_correction: i32,
    settings: SourceSettings,
    blocks: Option<Receiver<BlockResult>>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl RtlSdrSource {
    pub fn new(device_index: u32, ppm_correction: i32, settings: SourceSettings) -> Self {
        Self {
            device_index,
            ppm_correction,
            settings,
            blocks: None,
            stop: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }
}

fn configure(
    device: &mut rtlsdr::RTLSDRDevice,
    settings: &SourceSettings,
    ppm_correction: i32,
) -> Result<(), DeviceError> {
    let config_err = |what: &str, err: rtlsdr::RTLSDRError| {
        DeviceError::Config(format!("failed to set {what}: {err}"))
    };

    let center: u32 = (settings.center_freq_hz.round() as u64)
        .try_into()
        .map_err(|_| {
            DeviceError::Config(format!(
                "center frequency {} Hz is out of range",
                settings.center_freq_hz
            ))
        })?;
    device
        .set_center_freq(center)
        .map_err(|err| config_err("center frequency", err))?;
    device
        .set_sample_rate(settings.sample_rate_hz.round() as u32)
        .map_err(|err| config_err("sample rate", err))?;

    match settings.gain {
        Gain::Auto => device
            .set_tuner_gain_mode(false)
            .map_err(|err| config_err("automatic gain", err))?,
        Gain::Db(db) => {
            device
                .set_tuner_gain_mode(true)
                .map_err(|err| config_err("manual gain mode", err))?;
            device
                .set_tuner_gain((db * 10.0).round() as i32)
                .map_err(|err| config_err("tuner gain", err))?;
        }
    }
    if ppm_correction != 0 {
        device
            .set_freq_correction(ppm_correction)
            .map_err(|err| config_err("ppm correction", err))?;
    }
    device
        .reset_buffer()
        .map_err(|err| config_err("buffer reset", err))?;
    Ok(())
}

fn read_loop(
    mut device: rtlsdr::RTLSDRDevice,
    read_len: usize,
    tx: SyncSender<BlockResult>,
    stop: Arc<AtomicBool>,
) {
    let mut reads = 0u64;
    while !stop.load(Ordering::Relaxed) {
        let result = match device.read_sync(read_len) {
            Ok(buf) if buf.len() == read_len => Ok(buf),
            Ok(buf) => Err(DeviceError::Disconnected(format!(
                "short read: {} of {} bytes",
                buf.len(),
                read_len
            ))),
            Err(err) => Err(DeviceError::Disconnected(format!("read failed: {err}"))),
        };
        let failed = result.is_err();
        if tx.send(result).is_err() || failed {
            break;
        }
        reads += 1;
    }
    if let Err(err) = device.close() {
        warn!("closing RTL-SDR device failed: {}", err);
    }
    info!("RTL-SDR reader stopped after {} reads", reads);
}

impl SampleSource for RtlSdrSource {
    fn open(&mut self) -> Result<(), DeviceError> {
        let index = i32::try_from(self.device_index)
            .map_err(|_| DeviceError::Config(format!("device index {}", self.device_index)))?;
        let settings = self.settings.clone();
        let ppm = self.ppm_correction;
        let read_len = settings.block_size * 2;
        let stop = Arc::clone(&self.stop);
        stop.store(false, Ordering::Relaxed);

        let (init_tx, init_rx) = mpsc::channel::<Result<(), DeviceError>>();
        let (tx, rx) = mpsc::sync_channel::<BlockResult>(2);

        let reader = thread::Builder::new()
            .name("rtlsdr-reader".into())
            .spawn(move || {
                let mut device = match rtlsdr::open(index) {
                    Ok(device) => device,
                    Err(err) => {
                        let _ = init_tx.send(Err(DeviceError::Open(format!(
                            "RTL-SDR device {index}: {err}"
                        ))));
                        return;
                    }
                };
                if let Err(err) = configure(&mut device, &settings, ppm) {
                    let _ = device.close();
                    let _ = init_tx.send(Err(err));
                    return;
                }
                let _ = init_tx.send(Ok(()));
                read_loop(device, read_len, tx, stop);
            })
            .map_err(|err| DeviceError::Open(format!("spawning reader thread: {err}")))?;

        let init = init_rx
            .recv()
            .map_err(|_| DeviceError::Open("reader thread exited during setup".into()))?;
        if let Err(err) = init {
            let _ = reader.join();
            return Err(err);
        }

        info!(
            "RTL-SDR {} open: {:.3} MHz, {:.3} MS/s, gain {}, ppm {}",
            self.device_index,
            self.settings.center_freq_hz / 1e6,
            self.settings.sample_rate_hz / 1e6,
            self.settings.gain,
            self.ppm_correction
        );
        self.blocks = Some(rx);
        self.reader = Some(reader);
        Ok(())
    }

    fn acquire(&mut self) -> Result<SampleBlock, DeviceError> {
        let blocks = self
            .blocks
            .as_ref()
            .ok_or_else(|| DeviceError::Disconnected("device is not open".into()))?;
        let bytes = blocks
            .recv()
            .map_err(|_| DeviceError::Disconnected("reader thread stopped".into()))??;
        Ok(SampleBlock::new(cu8_to_complex(&bytes), &self.settings))
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Dropping the receiver unblocks a reader waiting on a full channel.
        self.blocks = None;
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                error!("RTL-SDR reader thread panicked");
            }
        }
    }

    fn settings(&self) -> &SourceSettings {
        &self.settings
    }
}

impl Drop for RtlSdrSource {
    fn drop(&mut self) {
        self.close();
    }
}
