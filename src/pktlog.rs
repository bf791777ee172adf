//! Append-only hex packet log, mirroring `ModemBaseCom.logOn`/`logOff`.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::packet::Packet;

#[derive(Default)]
pub struct PacketLog {
    file: Option<File>,
    path: Option<PathBuf>,
}

impl PacketLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `name` for logging. If it already exists, tries `name.1`,
    /// `name.2`, ... until an unused path is found, printing the chosen
    /// path. On failure to open, prints a diagnostic and leaves logging
    /// off.
    pub fn log_on(&mut self, name: impl AsRef<Path>) {
        self.log_off();

        let mut path = name.as_ref().to_path_buf();
        if path.exists() {
            let mut i = 1;
            loop {
                let candidate = append_suffix(name.as_ref(), i);
                if !candidate.exists() {
                    println!(
                        "{} exists, logging to file {}",
                        name.as_ref().display(),
                        candidate.display()
                    );
                    path = candidate;
                    break;
                }
                i += 1;
            }
        }

        match File::create(&path) {
            Ok(file) => {
                self.path = Some(path);
                self.file = Some(file);
            }
            Err(e) => {
                eprintln!("Failed to open {}: {}", path.display(), e);
            }
        }
    }

    pub fn log_off(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
            let _ = file.sync_all();
            if let Some(path) = self.path.take() {
                println!("Closed logfile {}", path.display());
            }
        }
    }

    pub fn log(&mut self, pkt: &Packet) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let line = format!(
            "{}.{:03} {}\n",
            now.as_secs(),
            now.subsec_millis(),
            pkt.to_hex_string()
        );
        if file.write_all(line.as_bytes()).is_ok() {
            let _ = file.flush();
            let _ = file.sync_all();
        }
    }

    pub fn is_on(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for PacketLog {
    fn drop(&mut self) {
        self.log_off();
    }
}

fn append_suffix(path: &Path, n: u32) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(format!(".{}", n));
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::fs;

    use crate::packet::make_packet;
    use crate::packet::Address;

    #[test]
    fn uniquifies_existing_path() {
        let dir = std::env::temp_dir().join(format!("ahoi-log-test-{}", std::process::id()));
        let _ = fs::create_dir_all(&dir);
        let base = dir.join("pkts.log");
        fs::write(&base, b"existing").unwrap();

        let mut log = PacketLog::new();
        log.log_on(&base);
        assert!(log.is_on());
        log.log(&make_packet(
            Address(0),
            Address(1),
            0x80,
            0,
            0,
            Bytes::new(),
        ));
        log.log_off();

        // suffixing appends ".1" onto the whole file name, not the extension
        let chosen = dir.join("pkts.log.1");
        assert!(chosen.exists(), "expected uniquified log file to exist");
        let _ = fs::remove_dir_all(&dir);
    }
}
