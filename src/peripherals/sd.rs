//! SD-card file peripheral
//!
//! A block-oriented file-access device on ports 0x10..0x15, backed by a
//! directory on the host filesystem (default `storage`). The guest streams
//! a NUL-terminated filename into the name port, issues a command, then
//! reads or writes bytes one at a time through the data port.
//!
//! Port map:
//! ```text
//! 0x10 write : command
//! 0x11 read  : status (READY | ERROR | DATA)
//! 0x12 read  : next file byte, or next directory-listing character
//! 0x12 write : append byte to the open file
//! 0x13 write : append byte to the filename buffer (0 terminates)
//! 0x14/0x15  : low/high byte of the 16-bit seek register
//! ```
//!
//! Errors never reach the host as `Err` values: they set `ERROR|READY` in
//! the status byte for the guest to poll, and the next successful command
//! clears `ERROR` again.

use std::fs::{self, File, OpenOptions, ReadDir};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use log::{debug, warn};
use thiserror::Error;

/// Command port
pub const SD_CMD_PORT: u8 = 0x10;
/// Status port
pub const SD_STATUS_PORT: u8 = 0x11;
/// Data port
pub const SD_DATA_PORT: u8 = 0x12;
/// Filename port
pub const SD_FNAME_PORT: u8 = 0x13;
/// Seek register, low byte
pub const SD_SEEK_LO: u8 = 0x14;
/// Seek register, high byte
pub const SD_SEEK_HI: u8 = 0x15;

// Commands
const CMD_OPEN_READ: u8 = 0x01;
const CMD_CREATE: u8 = 0x02;
const CMD_OPEN_APPEND: u8 = 0x03;
const CMD_SEEK_START: u8 = 0x04;
const CMD_CLOSE: u8 = 0x05;
const CMD_DIR: u8 = 0x06;
const CMD_OPEN_RW: u8 = 0x07;
const CMD_SEEK_BYTE: u8 = 0x08;
const CMD_SEEK_16: u8 = 0x09;

// Status bits
/// Device ready for a command
pub const SD_STATUS_READY: u8 = 0x01;
/// Last command failed
pub const SD_STATUS_ERROR: u8 = 0x02;
/// A file or directory listing is open for reading
pub const SD_STATUS_DATA: u8 = 0x80;

/// Filename buffer capacity (255 bytes + NUL)
const FILENAME_MAX: usize = 255;

/// Command failures, reported to the guest as `ERROR|READY` on the status
/// port
#[derive(Debug, Error)]
pub enum SdError {
    #[error("failed to open {}", path.display())]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no open file")]
    NoOpenFile,
    #[error("seek target {pos} is beyond end of file ({len} bytes)")]
    SeekBeyondEnd { pos: u16, len: u64 },
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// SD-card peripheral state
pub struct SdCard {
    storage_dir: PathBuf,
    filename: String,
    /// A NUL terminated the name; the next name byte starts a fresh one
    filename_complete: bool,
    file: Option<File>,
    dir: Option<ReadDir>,
    dir_entry: Vec<u8>,
    dir_entry_pos: usize,
    seek_pos: u16,
    status: u8,
}

impl SdCard {
    pub fn new(storage_dir: PathBuf) -> Self {
        Self {
            storage_dir,
            filename: String::new(),
            filename_complete: false,
            file: None,
            dir: None,
            dir_entry: Vec::new(),
            dir_entry_pos: 0,
            seek_pos: 0,
            status: SD_STATUS_READY,
        }
    }

    /// Redirect the peripheral at a different host directory.
    pub fn set_storage_dir(&mut self, dir: PathBuf) {
        self.storage_dir = dir;
    }

    fn full_path(&self) -> PathBuf {
        self.storage_dir.join(&self.filename)
    }

    /// Handle a read of one of the SD ports.
    pub fn read_port(&mut self, port: u8) -> u8 {
        match port {
            SD_STATUS_PORT => {
                let mut status = self.status;
                if self.file.is_some() || self.dir.is_some() {
                    status |= SD_STATUS_DATA;
                }
                status
            }
            SD_DATA_PORT => self.read_data(),
            _ => 0xFF,
        }
    }

    /// Handle a write to one of the SD ports.
    pub fn write_port(&mut self, port: u8, val: u8) {
        match port {
            SD_CMD_PORT => {
                if !(CMD_OPEN_READ..=CMD_SEEK_16).contains(&val) {
                    return; // unknown command, status untouched
                }
                match self.run_command(val) {
                    Ok(()) => self.status = SD_STATUS_READY,
                    Err(err) => {
                        debug!("sd: command {:#04x} failed: {}", val, err);
                        self.status = SD_STATUS_ERROR | SD_STATUS_READY;
                    }
                }
            }
            SD_DATA_PORT => {
                if let Some(file) = self.file.as_mut() {
                    if let Err(err) = file.write_all(&[val]) {
                        warn!("sd: write failed: {}", err);
                    }
                }
            }
            SD_FNAME_PORT => {
                if val == 0 {
                    self.filename_complete = true;
                    debug!("sd: filename set: {}", self.filename);
                } else {
                    if self.filename_complete {
                        self.filename.clear();
                        self.filename_complete = false;
                    }
                    if self.filename.len() < FILENAME_MAX {
                        self.filename.push(val as char);
                    }
                }
            }
            SD_SEEK_LO => {
                self.seek_pos = (self.seek_pos & 0xFF00) | u16::from(val);
            }
            SD_SEEK_HI => {
                self.seek_pos = (self.seek_pos & 0x00FF) | (u16::from(val) << 8);
            }
            _ => {}
        }
    }

    fn run_command(&mut self, cmd: u8) -> Result<(), SdError> {
        match cmd {
            CMD_OPEN_READ => {
                let path = self.full_path();
                self.file = None;
                let file = File::open(&path).map_err(|source| SdError::OpenFailed {
                    path: path.clone(),
                    source,
                })?;
                debug!("sd: opened for read: {}", path.display());
                self.file = Some(file);
                Ok(())
            }
            CMD_CREATE => {
                let path = self.full_path();
                self.file = None;
                fs::create_dir_all(&self.storage_dir)?;
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)
                    .map_err(|source| SdError::OpenFailed {
                        path: path.clone(),
                        source,
                    })?;
                debug!("sd: created: {}", path.display());
                self.file = Some(file);
                Ok(())
            }
            CMD_OPEN_APPEND => {
                let path = self.full_path();
                self.file = None;
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&path)
                    .map_err(|source| SdError::OpenFailed {
                        path: path.clone(),
                        source,
                    })?;
                file.seek(SeekFrom::End(0))?;
                debug!("sd: opened for append: {}", path.display());
                self.file = Some(file);
                Ok(())
            }
            CMD_OPEN_RW => {
                let path = self.full_path();
                self.file = None;
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&path)
                    .map_err(|source| SdError::OpenFailed {
                        path: path.clone(),
                        source,
                    })?;
                debug!("sd: opened for read/write: {}", path.display());
                self.file = Some(file);
                Ok(())
            }
            CMD_SEEK_START => {
                let file = self.file.as_mut().ok_or(SdError::NoOpenFile)?;
                file.seek(SeekFrom::Start(0))?;
                debug!("sd: seeked to start");
                Ok(())
            }
            CMD_SEEK_BYTE | CMD_SEEK_16 => {
                let pos = self.seek_pos;
                let file = self.file.as_mut().ok_or(SdError::NoOpenFile)?;
                let len = file.metadata()?.len();
                if u64::from(pos) > len {
                    return Err(SdError::SeekBeyondEnd { pos, len });
                }
                file.seek(SeekFrom::Start(u64::from(pos)))?;
                debug!("sd: seeked to {}", pos);
                Ok(())
            }
            CMD_CLOSE => {
                self.file = None;
                self.dir = None;
                debug!("sd: closed");
                Ok(())
            }
            CMD_DIR => {
                self.dir = None;
                fs::create_dir_all(&self.storage_dir)?;
                let dir = fs::read_dir(&self.storage_dir)?;
                self.dir = Some(dir);
                self.dir_entry.clear();
                self.dir_entry_pos = 0;
                debug!("sd: listing {}", self.storage_dir.display());
                Ok(())
            }
            _ => unreachable!("filtered by write_port"),
        }
    }

    /// Next byte of the open file, or the next character of the directory
    /// listing. EOF closes the handle and returns 0.
    fn read_data(&mut self) -> u8 {
        if let Some(file) = self.file.as_mut() {
            let mut buf = [0u8; 1];
            return match file.read_exact(&mut buf) {
                Ok(()) => buf[0],
                Err(_) => {
                    self.file = None;
                    self.status = SD_STATUS_READY;
                    0
                }
            };
        }

        if self.dir.is_some() {
            if self.dir_entry_pos >= self.dir_entry.len() && !self.next_dir_entry() {
                return 0;
            }
            let c = self.dir_entry[self.dir_entry_pos];
            self.dir_entry_pos += 1;
            return c;
        }

        0
    }

    /// Advance to the next directory entry, skipping `.` and `..`.
    /// Returns false (and closes the listing) at the end.
    fn next_dir_entry(&mut self) -> bool {
        let dir = match self.dir.as_mut() {
            Some(dir) => dir,
            None => return false,
        };
        for entry in dir.by_ref().flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == "." || name == ".." {
                continue;
            }
            self.dir_entry = format!("{}\r\n", name).into_bytes();
            self.dir_entry_pos = 0;
            return true;
        }
        self.dir = None;
        self.status = SD_STATUS_READY;
        false
    }

    /// Whether `port` belongs to this peripheral.
    pub fn handles_port(port: u8) -> bool {
        (SD_CMD_PORT..=SD_SEEK_HI).contains(&port)
    }
}
