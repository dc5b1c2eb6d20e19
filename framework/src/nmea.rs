/// NMEA sentence sanitizer
///
/// Sits between the raw GPS byte stream and the NMEA decoder. Reassembles
/// lines, drops torn reads (common on polled I2C), rewrites multi-constellation
/// GGA/RMC talkers to the GPS-only form the decoder understands, and makes
/// every forwarded checksum consistent with the forwarded body.
use log::debug;

/// Longest line accepted; anything longer is rejected as a whole
pub const MAX_SENTENCE_LEN: usize = 120;

/// I2C receivers pad empty reads with 0xFF
const PAD_BYTE: u8 = 0xFF;

/// Talkers whose GGA/RMC lines are cached for the diagnostics digest
const DIAG_TALKERS: [&str; 5] = ["GP", "GN", "GA", "BD", "GL"];

/// Talker rewrites applied before decoding
const REMAPS: [(&str, &str); 2] = [("GNGGA", "GPGGA"), ("GNRMC", "GPRMC")];

/// XOR of every byte of `body` (the text between `$` and `*`)
pub fn nmea_checksum(body: &str) -> u8 {
    body.bytes().fold(0, |cs, b| cs ^ b)
}

/// True when the last `*` in the line is followed by two hex digits
pub fn has_checksum_trailer(line: &str) -> bool {
    match line.rfind('*') {
        Some(star) => {
            let bytes = line.as_bytes();
            bytes.len() > star + 2
                && bytes[star + 1].is_ascii_hexdigit()
                && bytes[star + 2].is_ascii_hexdigit()
        }
        None => false,
    }
}

/// Remap GN talkers on GGA/RMC and rewrite the checksum trailer
///
/// Lines that do not start with `$` or carry no `*` are returned unchanged.
pub fn normalize_sentence(line: &str) -> String {
    rewrite(line).0
}

/// Returns the rewritten line and whether the talker was remapped
fn rewrite(line: &str) -> (String, bool) {
    let star = match line.rfind('*') {
        Some(star) if line.starts_with('$') => star,
        _ => return (line.to_string(), false),
    };

    let body = &line[1..star];
    let mut fixed = String::with_capacity(line.len());
    fixed.push('$');

    let remap = REMAPS.iter().find(|(from, _)| body.starts_with(from));
    match remap {
        Some((from, to)) => {
            fixed.push_str(to);
            fixed.push_str(&body[from.len()..]);
        }
        None => fixed.push_str(body),
    }

    let cs = nmea_checksum(&fixed[1..]);
    fixed.push('*');
    fixed.push(hex_digit(cs >> 4));
    fixed.push(hex_digit(cs));

    (fixed, remap.is_some())
}

fn hex_digit(v: u8) -> char {
    let v = v & 0x0F;
    if v < 10 {
        (b'0' + v) as char
    } else {
        (b'A' + v - 10) as char
    }
}

/// Checksum declared by the trailer, if it parses
fn declared_checksum(line: &str) -> Option<u8> {
    let star = line.rfind('*')?;
    let digits = line.get(star + 1..star + 3)?;
    u8::from_str_radix(digits, 16).ok()
}

/// A checksum-consistent sentence ready for the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    text: String,
    remapped: bool,
}

impl Sentence {
    /// Sentence text without line terminator
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Bytes to hand to the decoder, CRLF included
    pub fn wire_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.text.bytes().chain(*b"\r\n")
    }

    pub fn was_remapped(&self) -> bool {
        self.remapped
    }
}

/// Line counters for the diagnostics digest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizerStats {
    /// Non-empty lines completed
    pub lines: u32,
    pub forwarded: u32,
    /// Dropped by the checksum gate
    pub malformed: u32,
    /// Rejected for exceeding the length limit
    pub overflowed: u32,
    pub remapped: u32,
    /// Original trailer disagreed with the original body
    pub checksum_mismatches: u32,
}

/// Byte-at-a-time line assembler and sentence repairer
pub struct NmeaSanitizer {
    line: Vec<u8>,
    max_len: usize,
    discarding: bool,
    last_gga: Option<String>,
    last_rmc: Option<String>,
    stats: SanitizerStats,
}

impl NmeaSanitizer {
    pub fn new() -> Self {
        Self::with_max_len(MAX_SENTENCE_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            line: Vec::with_capacity(max_len),
            max_len,
            discarding: false,
            last_gga: None,
            last_rmc: None,
            stats: SanitizerStats::default(),
        }
    }

    /// Feed a single byte from the GPS stream
    ///
    /// Returns a sentence when a newline completes a line that passed the
    /// checksum gate.
    pub fn feed_byte(&mut self, byte: u8) -> Option<Sentence> {
        match byte {
            b'\r' | PAD_BYTE => None,
            b'\n' => {
                if self.discarding {
                    self.discarding = false;
                    self.line.clear();
                    return None;
                }
                if self.line.is_empty() {
                    return None;
                }
                let raw = core::mem::take(&mut self.line);
                self.line.reserve(self.max_len);
                self.complete_line(raw)
            }
            _ => {
                if self.discarding {
                    return None;
                }
                if self.line.len() >= self.max_len {
                    // Rest of this line is dropped up to the next newline
                    self.stats.overflowed += 1;
                    self.line.clear();
                    self.discarding = true;
                    debug!("NMEA line exceeded {} bytes, discarding", self.max_len);
                    return None;
                }
                self.line.push(byte);
                None
            }
        }
    }

    /// Feed a buffer; every completed sentence goes to `sink`
    pub fn feed<F: FnMut(Sentence)>(&mut self, bytes: &[u8], mut sink: F) -> usize {
        let mut count = 0;
        for &b in bytes {
            if let Some(sentence) = self.feed_byte(b) {
                sink(sentence);
                count += 1;
            }
        }
        count
    }

    fn complete_line(&mut self, raw: Vec<u8>) -> Option<Sentence> {
        self.stats.lines += 1;

        let raw = match String::from_utf8(raw) {
            Ok(raw) => raw,
            Err(_) => {
                self.stats.malformed += 1;
                debug!("NMEA line is not text, dropped");
                return None;
            }
        };

        self.cache_diagnostics(&raw);

        if !has_checksum_trailer(&raw) {
            self.stats.malformed += 1;
            debug!("NMEA line without checksum dropped: {}", raw);
            return None;
        }

        if let (Some(star), Some(declared)) = (raw.rfind('*'), declared_checksum(&raw)) {
            if raw.starts_with('$') && nmea_checksum(&raw[1..star]) != declared {
                self.stats.checksum_mismatches += 1;
            }
        }

        let (text, remapped) = rewrite(&raw);
        if remapped {
            self.stats.remapped += 1;
        }
        self.stats.forwarded += 1;

        Some(Sentence { text, remapped })
    }

    fn cache_diagnostics(&mut self, raw: &str) {
        let Some(rest) = raw.strip_prefix('$') else {
            return;
        };
        let talker_known = DIAG_TALKERS.iter().any(|t| rest.starts_with(t));
        if !talker_known {
            return;
        }
        match rest.get(2..5) {
            Some("GGA") => self.last_gga = Some(raw.to_string()),
            Some("RMC") => self.last_rmc = Some(raw.to_string()),
            _ => {}
        }
    }

    /// Drop any partial line
    pub fn reset(&mut self) {
        self.line.clear();
        self.discarding = false;
    }

    /// Most recent raw GGA line, verbatim
    pub fn last_gga(&self) -> Option<&str> {
        self.last_gga.as_deref()
    }

    /// Most recent raw RMC line, verbatim
    pub fn last_rmc(&self) -> Option<&str> {
        self.last_rmc.as_deref()
    }

    pub fn stats(&self) -> SanitizerStats {
        self.stats
    }

    /// Bytes of the line currently being assembled
    pub fn pending_len(&self) -> usize {
        self.line.len()
    }
}

impl Default for NmeaSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
