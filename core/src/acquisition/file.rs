use crate::acquisition::sample::{cu8_to_complex, SampleBlock, SourceSettings};
use crate::acquisition::source::SampleSource;
use crate::prelude::DeviceError;
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Replays an rtl_sdr style capture (interleaved unsigned 8-bit I/Q).
pub struct IqFileSource {
    path: PathBuf,
    settings: SourceSettings,
    repeat: bool,
    reader: Option<BufReader<File>>,
    scratch: Vec<u8>,
    blocks_read: u64,
}

impl IqFileSource {
    pub fn new(path: impl Into<PathBuf>, settings: SourceSettings, repeat: bool) -> Self {
        Self {
            path: path.into(),
            settings,
            repeat,
            reader: None,
            scratch: Vec::new(),
            blocks_read: 0,
        }
    }

    fn fill_block(reader: &mut BufReader<File>, scratch: &mut [u8]) -> Result<bool, DeviceError> {
        match reader.read_exact(scratch) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(err) => Err(DeviceError::Read(err)),
        }
    }
}

impl SampleSource for IqFileSource {
    fn open(&mut self) -> Result<(), DeviceError> {
        if self.settings.block_size == 0 {
            return Err(DeviceError::Config("block size must be at least 1".into()));
        }
        let file = File::open(&self.path)
            .map_err(|err| DeviceError::Open(format!("{}: {}", self.path.display(), err)))?;
        self.scratch = vec![0u8; self.settings.block_size * 2];
        self.reader = Some(BufReader::new(file));
        self.blocks_read = 0;
        info!("replaying IQ capture {}", self.path.display());
        Ok(())
    }

    fn acquire(&mut self) -> Result<SampleBlock, DeviceError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| DeviceError::Disconnected("capture file is not open".into()))?;

        let mut filled = Self::fill_block(reader, &mut self.scratch)?;
        if !filled && self.repeat && self.blocks_read > 0 {
            debug!("rewinding {} after {} blocks", self.path.display(), self.blocks_read);
            reader.seek(SeekFrom::Start(0))?;
            filled = Self::fill_block(reader, &mut self.scratch)?;
        }
        if !filled {
            return Err(DeviceError::EndOfStream);
        }

        self.blocks_read += 1;
        Ok(SampleBlock::new(cu8_to_complex(&self.scratch), &self.settings))
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            info!(
                "closed IQ capture {} after {} blocks",
                self.path.display(),
                self.blocks_read
            );
        }
    }

    fn settings(&self) -> &SourceSettings {
        &self.settings
    }
}
