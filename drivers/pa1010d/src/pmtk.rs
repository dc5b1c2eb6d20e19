//! PMTK command support for MediaTek-based GPS modules
//!
//! Commands are NMEA-framed ASCII: `$<body>*<checksum>\r\n`. They are built
//! into caller-provided buffers and written to the module over I2C or UART.

use crate::checksum;

/// Output only GGA and RMC (GLL, VTG, GSA, GSV off)
pub const SET_NMEA_OUTPUT_RMC_GGA: &str = "PMTK314,0,1,0,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0";

/// 1 Hz position fix interval
pub const SET_POS_FIX_1HZ: &str = "PMTK220,1000";

/// Largest framed command produced by this module
pub const MAX_COMMAND_LEN: usize = 64;

/// Frame a PMTK body into `buffer`
///
/// Returns the number of bytes written, or None if the buffer is too small.
pub fn command(body: &str, buffer: &mut [u8]) -> Option<usize> {
    let len = body.len() + 6; // '$' + body + '*' + 2 hex + CRLF
    if buffer.len() < len {
        return None;
    }

    let cs = checksum(body);
    buffer[0] = b'$';
    buffer[1..1 + body.len()].copy_from_slice(body.as_bytes());

    let tail = &mut buffer[1 + body.len()..len];
    tail[0] = b'*';
    tail[1] = hex_digit(cs >> 4);
    tail[2] = hex_digit(cs);
    tail[3] = b'\r';
    tail[4] = b'\n';

    Some(len)
}

/// Fix interval command for a given update period
///
/// The PA1010D accepts 100 ms to 10 s.
pub fn set_fix_interval(interval_ms: u16, buffer: &mut [u8]) -> Option<usize> {
    let interval_ms = interval_ms.clamp(100, 10_000);

    let mut body = [0u8; 16];
    body[..8].copy_from_slice(b"PMTK220,");
    let digits = write_decimal(interval_ms, &mut body[8..]);
    let body = core::str::from_utf8(&body[..8 + digits]).ok()?;

    command(body, buffer)
}

/// Module setup: GGA+RMC output, then 1 Hz fixes
///
/// Returns (offset, length) of each command in `buffer`.
pub fn init_sequence(buffer: &mut [u8; 2 * MAX_COMMAND_LEN]) -> [(usize, usize); 2] {
    let mut offset = 0;

    let output_len = command(SET_NMEA_OUTPUT_RMC_GGA, &mut buffer[offset..]).unwrap_or(0);
    let output_cmd = (offset, output_len);
    offset += output_len;

    let rate_len = command(SET_POS_FIX_1HZ, &mut buffer[offset..]).unwrap_or(0);
    let rate_cmd = (offset, rate_len);

    [output_cmd, rate_cmd]
}

fn hex_digit(v: u8) -> u8 {
    let v = v & 0x0F;
    if v < 10 {
        b'0' + v
    } else {
        b'A' + v - 10
    }
}

fn write_decimal(mut value: u16, out: &mut [u8]) -> usize {
    let mut tmp = [0u8; 5];
    let mut n = 0;
    loop {
        tmp[n] = b'0' + (value % 10) as u8;
        n += 1;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    for (i, d) in tmp[..n].iter().rev().enumerate() {
        out[i] = *d;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_framing() {
        let mut buffer = [0u8; 32];
        let len = command(SET_POS_FIX_1HZ, &mut buffer).unwrap();
        assert_eq!(&buffer[..len], b"$PMTK220,1000*1F\r\n");
    }

    #[test]
    fn test_output_selection_checksum() {
        let mut buffer = [0u8; MAX_COMMAND_LEN];
        let len = command(SET_NMEA_OUTPUT_RMC_GGA, &mut buffer).unwrap();
        assert!(buffer[..len].ends_with(b"*28\r\n"));
    }

    #[test]
    fn test_buffer_too_small() {
        let mut buffer = [0u8; 8];
        assert_eq!(command(SET_POS_FIX_1HZ, &mut buffer), None);
    }

    #[test]
    fn test_fix_interval_clamped() {
        let mut buffer = [0u8; 32];
        let len = set_fix_interval(1000, &mut buffer).unwrap();
        assert_eq!(&buffer[..len], b"$PMTK220,1000*1F\r\n");

        let len = set_fix_interval(5, &mut buffer).unwrap();
        assert!(buffer[..len].starts_with(b"$PMTK220,100*"));
    }

    #[test]
    fn test_init_sequence() {
        let mut buffer = [0u8; 2 * MAX_COMMAND_LEN];
        let commands = init_sequence(&mut buffer);

        // Output selection first, then rate
        let (out_off, out_len) = commands[0];
        assert_eq!(out_off, 0);
        assert!(buffer[out_off..out_off + out_len].starts_with(b"$PMTK314,"));

        let (rate_off, rate_len) = commands[1];
        assert_eq!(rate_off, out_len);
        assert_eq!(&buffer[rate_off..rate_off + rate_len], b"$PMTK220,1000*1F\r\n");
    }
}
