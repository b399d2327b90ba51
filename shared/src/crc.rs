/// CRC-16/CCITT-FALSE (polynomial 0x1021, init 0xFFFF, no reflection)
pub struct Crc16 {
    table: [u16; 256],
}

impl Crc16 {
    const POLYNOMIAL: u16 = 0x1021;
    const INIT: u16 = 0xFFFF;

    const fn build_table() -> [u16; 256] {
        let mut table = [0u16; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = (i as u16) << 8;
            let mut j = 0;
            while j < 8 {
                if crc & 0x8000 != 0 {
                    crc = (crc << 1) ^ Self::POLYNOMIAL;
                } else {
                    crc <<= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    }

    /// Computes the checksum of `data`
    pub fn checksum(&self, data: &[u8]) -> u16 {
        self.update(Self::INIT, data)
    }

    /// Feeds more data into a running checksum (for streaming computation)
    pub fn update(&self, mut crc: u16, data: &[u8]) -> u16 {
        for &byte in data {
            let index = ((crc >> 8) ^ byte as u16) & 0xFF;
            crc = (crc << 8) ^ self.table[index as usize];
        }
        crc
    }

    pub fn init() -> u16 {
        Self::INIT
    }
}

/// Global instance with a compile-time lookup table
static CRC16: Crc16 = Crc16 {
    table: Crc16::build_table(),
};

pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Streaming form: checksum over several slices as if concatenated
pub fn crc16_parts(parts: &[&[u8]]) -> u16 {
    parts
        .iter()
        .fold(Crc16::init(), |crc, part| CRC16.update(crc, part))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_known_values() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
        assert_eq!(crc16(b""), 0xFFFF);
    }

    #[test]
    fn test_crc16_incremental() {
        let data = b"Hello, radio!";
        assert_eq!(crc16(data), crc16_parts(&[&data[..4], &data[4..]]));
    }

    #[test]
    fn test_crc16_detects_single_bit_flip() {
        let mut data = *b"telemetry";
        let original = crc16(&data);
        data[3] ^= 0x01;
        assert_ne!(original, crc16(&data));
    }
}
