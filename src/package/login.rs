//! The `Login` packet body and the `LoginAck` package that answers it
//! (§4.6). `Login` carries no token byte of its own -- it *is* the body
//! of a packet of `PacketType::Login` -- so only its encoder lives here;
//! decoding inbound Login packets is a server-side concern and out of
//! scope (Non-goal: server-side implementation).

use crate::byte_channel::ByteChannel;
use crate::error::Result;

const FIELD_WIDTH: usize = 30;
const PASSWORD_FIELD_WIDTH: usize = 253;

fn write_fixed_field(ch: &mut ByteChannel, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(width);
    ch.write_u8(len as u8);
    ch.write_bytes(&bytes[..len]);
    for _ in len..width {
        ch.write_u8(0);
    }
}

/// Everything the client declares about itself at login time.
#[derive(Debug, Clone)]
pub struct LoginPackage {
    pub host_name: String,
    pub user_name: String,
    pub password: String,
    pub host_process: String,
    pub app_name: String,
    pub server_name: String,
    pub library_name: String,
    pub library_version: String,
    pub language: String,
    pub char_set: String,
    /// Present only when RSA-encrypted login is in effect: the
    /// ciphertext replacing the plaintext `password` field.
    pub encrypted_password: Option<Vec<u8>>,
}

impl LoginPackage {
    pub fn encode(&self, ch: &mut ByteChannel) {
        write_fixed_field(ch, &self.host_name, FIELD_WIDTH);
        write_fixed_field(ch, &self.user_name, FIELD_WIDTH);
        match &self.encrypted_password {
            Some(ciphertext) => {
                let len = ciphertext.len().min(PASSWORD_FIELD_WIDTH);
                ch.write_u8(len as u8);
                ch.write_bytes(&ciphertext[..len]);
                for _ in len..PASSWORD_FIELD_WIDTH {
                    ch.write_u8(0);
                }
            }
            None => write_fixed_field(ch, &self.password, PASSWORD_FIELD_WIDTH),
        }
        write_fixed_field(ch, &self.host_process, FIELD_WIDTH);
        write_fixed_field(ch, &self.app_name, FIELD_WIDTH);
        write_fixed_field(ch, &self.server_name, FIELD_WIDTH);
        write_fixed_field(ch, &self.library_name, FIELD_WIDTH);
        write_fixed_field(ch, &self.library_version, 10);
        write_fixed_field(ch, &self.language, FIELD_WIDTH);
        write_fixed_field(ch, &self.char_set, FIELD_WIDTH);
        ch.write_u8(self.encrypted_password.is_some() as u8);
    }
}

/// Outcome of a login attempt, returned by the server regardless of
/// success -- failures still carry a populated `LoginAck` alongside an
/// `Error`/`EED` package explaining why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    Succeed,
    Fail,
    Negotiate,
}

#[derive(Debug, Clone)]
pub struct LoginAckPackage {
    pub status: LoginStatus,
    pub tds_version: [u8; 4],
    pub server_name: String,
    pub server_version: [u8; 4],
}

impl LoginAckPackage {
    pub fn decode(ch: &mut ByteChannel) -> Result<Self> {
        let mut body = super::read_variable_body(ch)?;
        let status = match body.read_u8()? {
            5 => LoginStatus::Succeed,
            6 => LoginStatus::Fail,
            7 => LoginStatus::Negotiate,
            other => {
                return Err(crate::error::Error::ProtocolViolation(format!(
                    "unknown login ack status {other}"
                )))
            }
        };
        let mut tds_version = [0u8; 4];
        for b in tds_version.iter_mut() {
            *b = body.read_u8()?;
        }
        let name_len = body.read_u8()? as usize;
        let server_name = body.read_string(name_len)?;
        let mut server_version = [0u8; 4];
        for b in server_version.iter_mut() {
            *b = body.read_u8()?;
        }
        Ok(LoginAckPackage {
            status,
            tds_version,
            server_name,
            server_version,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::byte_channel::Endianness;

    #[test]
    fn login_ack_round_trip() {
        let mut body = ByteChannel::new(Endianness::Big);
        body.write_u8(5);
        body.write_bytes(&[5, 0, 0, 0]);
        let name = "ASE_SYBASE";
        body.write_u8(name.len() as u8);
        body.write_string(name);
        body.write_bytes(&[15, 7, 0, 0]);
        let body_bytes = body.into_inner();

        let mut wire = ByteChannel::new(Endianness::Big);
        wire.write_u8(body_bytes.len() as u8);
        wire.write_bytes(&body_bytes);

        let mut reader = ByteChannel::from_bytes(wire.into_inner(), Endianness::Big);
        let ack = LoginAckPackage::decode(&mut reader).unwrap();
        assert_eq!(ack.status, LoginStatus::Succeed);
        assert_eq!(ack.server_name, "ASE_SYBASE");
        assert_eq!(ack.tds_version, [5, 0, 0, 0]);
    }

    #[test]
    fn login_package_encodes_fixed_width_fields() {
        let login = LoginPackage {
            host_name: "workstation".into(),
            user_name: "sa".into(),
            password: "hunter2".into(),
            host_process: "1234".into(),
            app_name: "ase-tds".into(),
            server_name: "ASE".into(),
            library_name: "ase-tds".into(),
            library_version: "1.0".into(),
            language: "us_english".into(),
            char_set: "iso_1".into(),
            encrypted_password: None,
        };
        let mut ch = ByteChannel::new(Endianness::Big);
        login.encode(&mut ch);
        // 8 fields at width 30 (host_name, user_name, host_process,
        // app_name, server_name, library_name, language, char_set) +
        // password(1+253) + library_version(1+10) + encryption flag(1)
        let expected = 8 * (1 + 30) + (1 + 253) + (1 + 10) + 1;
        assert_eq!(ch.len(), expected);
    }
}
