use crate::signal::TimeSeries;
use anyhow::{anyhow, Context, Result};
use edf_reader::file_reader::SyncFileReader;
use edf_reader::sync_reader::SyncEDFReader;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Helper implementing the EDF reader trait for on-disk files.
struct DiskFileReader {
    path: PathBuf,
}

impl DiskFileReader {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl SyncFileReader for DiskFileReader {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, std::io::Error> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Which EDF signal to load: a zero-based index or a label such as `Fp1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSelector {
    Index(usize),
    Label(String),
}

impl From<&str> for ChannelSelector {
    fn from(value: &str) -> Self {
        match value.trim().parse::<usize>() {
            Ok(idx) => ChannelSelector::Index(idx),
            Err(_) => ChannelSelector::Label(value.trim().to_string()),
        }
    }
}

impl ChannelSelector {
    fn resolve<'a>(&self, mut labels: impl Iterator<Item = &'a str>) -> Result<usize> {
        match self {
            ChannelSelector::Index(idx) => Ok(*idx),
            ChannelSelector::Label(label) => labels
                .position(|candidate| candidate.trim().eq_ignore_ascii_case(label))
                .ok_or_else(|| anyhow!("no EDF channel labelled '{}'", label)),
        }
    }
}

/// Load a single EDF channel into a `TimeSeries` (physical units).
pub fn load_edf_channel(path: &Path, channel: &ChannelSelector) -> Result<TimeSeries> {
    let reader = SyncEDFReader::init_with_file_reader(DiskFileReader::new(path))
        .with_context(|| format!("reading EDF header of {}", path.display()))?;
    let header = &reader.edf_header;
    let channel = channel.resolve(header.channels.iter().map(|c| c.label.as_str()))?;
    if channel >= header.channels.len() {
        return Err(anyhow!(
            "EDF file has {} channels; channel {} is out of range",
            header.channels.len(),
            channel
        ));
    }
    let total_duration = header.block_duration * header.number_of_blocks;
    let data_matrix = reader
        .read_data_window(0, total_duration)
        .with_context(|| format!("reading EDF records of {}", path.display()))?;
    let channel_data = data_matrix
        .get(channel)
        .ok_or_else(|| anyhow!("missing channel data"))?;
    let hdr_chan = &header.channels[channel];
    let fs = hdr_chan.number_of_samples_in_data_record as f64 * 1000.0
        / header.block_duration as f64;
    Ok(TimeSeries {
        fs,
        data: channel_data.iter().map(|value| *value as f64).collect(),
    })
}
