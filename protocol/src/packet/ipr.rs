//! The IPR envelope a receiver hands to a sender out of band:
//! `[version = 2][condition: 32][packet: var octet string]`.

use crate::config::{CONDITION_LENGTH, IPR_VERSION};

use super::error::PacketError;
use super::oer::{Reader, Writer};

/// A decoded interactive payment request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ipr {
    pub condition: [u8; CONDITION_LENGTH],
    pub packet: Vec<u8>,
}

pub fn encode_ipr(packet: &[u8], condition: &[u8; CONDITION_LENGTH]) -> Vec<u8> {
    let mut writer = Writer::new();
    writer.write_u8(IPR_VERSION);
    writer.write_octet_string(condition);
    writer.write_var_octet_string(packet);
    writer.into_vec()
}

pub fn decode_ipr(bytes: &[u8]) -> Result<Ipr, PacketError> {
    let mut reader = Reader::new(bytes);
    let version = reader.read_u8()?;
    if version != IPR_VERSION {
        return Err(PacketError::UnsupportedIprVersion(version));
    }
    let mut condition = [0u8; CONDITION_LENGTH];
    condition.copy_from_slice(reader.read_octet_string(CONDITION_LENGTH)?);
    let packet = reader.read_var_octet_string()?.to_vec();
    reader.finish()?;
    Ok(Ipr { condition, packet })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let condition = [0xabu8; 32];
        let bytes = encode_ipr(b"packet", &condition);
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[1..33], &condition);
        let ipr = decode_ipr(&bytes).unwrap();
        assert_eq!(ipr.condition, condition);
        assert_eq!(ipr.packet, b"packet");
    }

    #[test]
    fn rejects_other_versions() {
        let mut bytes = encode_ipr(b"p", &[0u8; 32]);
        bytes[0] = 1;
        assert_eq!(decode_ipr(&bytes), Err(PacketError::UnsupportedIprVersion(1)));
    }

    #[test]
    fn rejects_truncation() {
        let bytes = encode_ipr(b"packet", &[0u8; 32]);
        assert!(decode_ipr(&bytes[..20]).is_err());
        assert!(decode_ipr(&bytes[..bytes.len() - 1]).is_err());
    }
}
