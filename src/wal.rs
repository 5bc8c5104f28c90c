use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Everything one operation wrote. Persisted as a single entry, so a crash
/// either keeps the whole unit or drops the whole unit.
pub type Unit = Vec<Event>;

/// Encode one unit as `[len][bincode][crc32]`. Returns the bytes written.
fn encode_unit(writer: &mut impl Write, unit: &[Event]) -> io::Result<u64> {
    let payload =
        bincode::serialize(unit).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "unit too large"))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(8 + u64::from(len))
}

/// Read exactly `buf.len()` bytes. `Ok(false)` means the log ended first.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only write-ahead log of units of work.
///
/// Format per entry: `[u32: len][bincode: Vec<Event>][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn or corrupt tail entry ends replay; everything before it is kept.
///
/// Units buffered since the last successful `flush_sync` are pending. A
/// failed flush must be followed by `rollback`, which cuts the file back to
/// its last durable length so no rejected unit can surface on replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    durable_len: u64,
    pending_len: u64,
    pending_units: u64,
    /// Set when a rollback itself failed; every later append is refused.
    poisoned: bool,
    #[cfg(test)]
    fail_next_flush: bool,
}

impl Wal {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let durable_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            durable_len,
            pending_len: 0,
            pending_units: 0,
            poisoned: false,
            #[cfg(test)]
            fail_next_flush: false,
        })
    }

    /// Append a single unit and fsync. Production code goes through
    /// `append_buffered` + `flush_sync` for group commit.
    #[cfg(test)]
    pub fn append(&mut self, unit: &[Event]) -> io::Result<()> {
        self.append_buffered(unit)?;
        self.flush_sync()
    }

    /// Buffer a unit without flushing. Durable only after `flush_sync()`.
    pub fn append_buffered(&mut self, unit: &[Event]) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other("wal unusable after a failed rollback"));
        }
        self.pending_len += encode_unit(&mut self.writer, unit)?;
        self.pending_units += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file. On success every
    /// pending unit becomes durable.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_flush) {
            return Err(io::Error::other("injected fsync failure"));
        }
        self.writer.get_ref().sync_all()?;
        self.durable_len += self.pending_len;
        self.appends_since_compact += self.pending_units;
        self.pending_len = 0;
        self.pending_units = 0;
        Ok(())
    }

    /// Discard every pending unit: drop the buffered bytes unwritten and
    /// truncate whatever already reached the file. If this fails the log is
    /// poisoned and refuses further appends.
    pub fn rollback(&mut self) -> io::Result<()> {
        let result = self.truncate_to_durable();
        self.pending_len = 0;
        self.pending_units = 0;
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn truncate_to_durable(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        file.set_len(self.durable_len)?;
        file.sync_all()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the buffer instead of writing it on drop
        let (_file, _unwritten) = stale.into_parts();
        Ok(())
    }

    /// Make the next `flush_sync` fail after its bytes reached the file.
    #[cfg(test)]
    pub fn fail_next_flush(&mut self) {
        self.fail_next_flush = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a snapshot to a temp file next to the log and fsync it.
    pub fn write_compact_file(path: &Path, units: &[Unit]) -> io::Result<()> {
        let file = File::create(Self::compact_path(path))?;
        let mut writer = BufWriter::new(file);
        for unit in units {
            encode_unit(&mut writer, unit)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.durable_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        self.pending_len = 0;
        self.pending_units = 0;
        self.poisoned = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, units: &[Unit]) -> io::Result<()> {
        Self::write_compact_file(&self.path, units)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay the log, returning every intact unit in write order. A torn or
    /// corrupt tail is cut off the file so later appends stay readable.
    pub fn replay(path: &Path) -> io::Result<Vec<Unit>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut units = Vec::new();
        let mut valid_len = 0u64;
        let mut torn = false;

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read(&mut len_buf[..1])? {
                0 => break,
                _ if !read_full(&mut reader, &mut len_buf[1..])? => {
                    tracing::warn!("wal: truncated length at tail of {}", path.display());
                    torn = true;
                    break;
                }
                _ => {}
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            if !read_full(&mut reader, &mut payload)? {
                tracing::warn!("wal: truncated entry at tail of {}", path.display());
                torn = true;
                break;
            }

            let mut crc_buf = [0u8; 4];
            if !read_full(&mut reader, &mut crc_buf)? {
                tracing::warn!("wal: truncated checksum at tail of {}", path.display());
                torn = true;
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!("wal: checksum mismatch in {}, stopping replay", path.display());
                torn = true;
                break;
            }

            match bincode::deserialize::<Unit>(&payload) {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    tracing::warn!("wal: undecodable entry in {}: {e}", path.display());
                    torn = true;
                    break;
                }
            }
            valid_len += 8 + len as u64;
        }

        if torn {
            OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
            tracing::warn!("wal: truncated {} to {valid_len} byte(s)", path.display());
        }
        Ok(units)
    }
}
