use super::WsError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest client frame accepted. Clients only send control frames here.
pub const MAX_PAYLOAD_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    pub fn from_u8(byte: u8) -> Result<Self, WsError> {
        match byte {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(WsError::UnknownOpcode(other)),
        }
    }

    pub fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode,
            payload: payload.into(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(Opcode::Text, text.as_bytes())
    }

    pub fn pong(payload: Vec<u8>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Close frame echoing the peer's status code, if it sent one.
    pub fn close(payload: &[u8]) -> Self {
        Self::new(Opcode::Close, payload.get(..2).unwrap_or_default())
    }

    /// Unmasked server-to-client encoding.
    pub fn encode(&self) -> Vec<u8> {
        let len = self.payload.len();
        let mut out = Vec::with_capacity(len + 10);
        out.push(if self.fin { 0x80 } else { 0x00 } | self.opcode as u8);
        if len <= 125 {
            out.push(len as u8);
        } else if len <= usize::from(u16::MAX) {
            out.push(126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
        out.extend_from_slice(&self.payload);
        out
    }
}

/// XOR masking; applying it twice restores the input.
pub fn apply_mask(payload: &mut [u8], key: &[u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Read one client frame, unmasking the payload.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, WsError> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;

    let fin = header[0] & 0x80 != 0;
    if (header[0] >> 4) & 0x07 != 0 {
        return Err(WsError::Protocol("reserved bits set without an extension"));
    }
    let opcode = Opcode::from_u8(header[0] & 0x0F)?;
    if header[1] & 0x80 == 0 {
        return Err(WsError::Protocol("client frame is not masked"));
    }

    let len = match header[1] & 0x7F {
        126 => u64::from(reader.read_u16().await?),
        127 => {
            let len = reader.read_u64().await?;
            if len >> 63 != 0 {
                return Err(WsError::Protocol("64-bit length has the high bit set"));
            }
            len
        }
        short => u64::from(short),
    };
    if opcode.is_control() && (len > 125 || !fin) {
        return Err(WsError::Protocol("invalid control frame"));
    }
    if len > MAX_PAYLOAD_SIZE {
        return Err(WsError::PayloadTooLarge(len));
    }

    let mut key = [0u8; 4];
    reader.read_exact(&mut key).await?;
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    apply_mask(&mut payload, &key);

    Ok(Frame {
        fin,
        opcode,
        payload,
    })
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<(), WsError> {
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masked(opcode: u8, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        let mut out = vec![0x80 | opcode];
        if payload.len() <= 125 {
            out.push(0x80 | payload.len() as u8);
        } else {
            out.push(0x80 | 126);
            out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        }
        out.extend_from_slice(&key);
        let mut body = payload.to_vec();
        apply_mask(&mut body, &key);
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn mask_is_symmetric() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let mut data = b"Hello".to_vec();
        apply_mask(&mut data, &key);
        assert_ne!(data, b"Hello");
        apply_mask(&mut data, &key);
        assert_eq!(data, b"Hello");
    }

    #[test]
    fn server_frames_use_all_three_length_forms() {
        assert_eq!(Frame::text("Hi").encode(), vec![0x81, 2, b'H', b'i']);

        let medium = Frame::new(Opcode::Binary, vec![0u8; 200]).encode();
        assert_eq!(&medium[..4], &[0x82, 126, 0, 200]);
        assert_eq!(medium.len(), 204);

        let large = Frame::new(Opcode::Binary, vec![0u8; 70_000]).encode();
        assert_eq!(large[1], 127);
        assert_eq!(u64::from_be_bytes(large[2..10].try_into().unwrap()), 70_000);
    }

    #[tokio::test]
    async fn reads_masked_client_frames() {
        let bytes = masked(0x1, b"ping me", [1, 2, 3, 4]);
        let frame = read_frame(&mut bytes.as_slice()).await.unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, b"ping me");

        let long = vec![b'x'; 300];
        let bytes = masked(0x2, &long, [9, 8, 7, 6]);
        let frame = read_frame(&mut bytes.as_slice()).await.unwrap();
        assert_eq!(frame.payload, long);
    }

    #[tokio::test]
    async fn unmasked_client_frames_are_rejected() {
        let bytes = vec![0x81, 0x02, b'H', b'i'];
        assert!(matches!(
            read_frame(&mut bytes.as_slice()).await,
            Err(WsError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn unknown_opcode_and_truncation_fail() {
        let bytes = masked(0x3, b"", [0; 4]);
        assert!(matches!(
            read_frame(&mut bytes.as_slice()).await,
            Err(WsError::UnknownOpcode(0x3))
        ));

        let truncated = vec![0x81u8, 0x85, 0, 0];
        assert!(matches!(
            read_frame(&mut truncated.as_slice()).await,
            Err(WsError::Io(_))
        ));
    }

    #[test]
    fn close_echo_keeps_only_the_status_code() {
        let frame = Frame::close(&[0x03, 0xE8, b'b', b'y', b'e']);
        assert_eq!(frame.payload, vec![0x03, 0xE8]);
        assert!(Frame::close(&[]).payload.is_empty());
    }
}
