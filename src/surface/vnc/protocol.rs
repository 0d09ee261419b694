//! Minimal RFB (VNC) wire codec: handshake, the client messages needed to
//! drive input, and decoding of server updates.
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{PilotError, PilotResult};
use crate::surface::vnc::auth;

pub const ENCODING_RAW: i32 = 0;
pub const ENCODING_COPY_RECT: i32 = 1;
pub const ENCODING_DESKTOP_SIZE: i32 = -223;

const SECURITY_NONE: u8 = 1;
const SECURITY_VNC_AUTH: u8 = 2;

const MAX_REASON_LEN: u32 = 64 * 1024;
const MAX_NAME_LEN: u32 = 64 * 1024;
const MAX_RECT_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V3_3,
    V3_7,
    V3_8,
}

impl ProtocolVersion {
    fn banner(self) -> &'static [u8; 12] {
        match self {
            ProtocolVersion::V3_3 => b"RFB 003.003\n",
            ProtocolVersion::V3_7 => b"RFB 003.007\n",
            ProtocolVersion::V3_8 => b"RFB 003.008\n",
        }
    }

    fn negotiate(server: &[u8; 12]) -> PilotResult<Self> {
        let text = std::str::from_utf8(server)
            .map_err(|_| PilotError::Protocol("non-ASCII protocol banner".into()))?;
        let parse = |s: &str| s.parse::<u32>().ok();
        let (major, minor) = match (text.get(0..4), text.get(4..7), text.get(8..11)) {
            (Some("RFB "), Some(maj), Some(min)) => match (parse(maj), parse(min)) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(PilotError::Protocol(format!("bad banner {text:?}"))),
            },
            _ => return Err(PilotError::Protocol(format!("bad banner {text:?}"))),
        };
        Ok(match (major, minor) {
            (m, _) if m > 3 => ProtocolVersion::V3_8,
            (3, n) if n >= 8 => ProtocolVersion::V3_8,
            (3, 7) => ProtocolVersion::V3_7,
            _ => ProtocolVersion::V3_3,
        })
    }
}

/// RFB pixel format (ServerInit / SetPixelFormat body).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_colour: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// 32bpp little-endian true colour, bytes on the wire are B, G, R, X.
    pub fn bgrx32() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_colour: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel / 8).max(1)
    }

    pub fn decode(b: &[u8; 16]) -> Self {
        Self {
            bits_per_pixel: b[0],
            depth: b[1],
            big_endian: b[2] != 0,
            true_colour: b[3] != 0,
            red_max: u16::from_be_bytes([b[4], b[5]]),
            green_max: u16::from_be_bytes([b[6], b[7]]),
            blue_max: u16::from_be_bytes([b[8], b[9]]),
            red_shift: b[10],
            green_shift: b[11],
            blue_shift: b[12],
        }
    }

    pub fn encode(&self) -> [u8; 16] {
        let mut b = [0u8; 16];
        b[0] = self.bits_per_pixel;
        b[1] = self.depth;
        b[2] = u8::from(self.big_endian);
        b[3] = u8::from(self.true_colour);
        b[4..6].copy_from_slice(&self.red_max.to_be_bytes());
        b[6..8].copy_from_slice(&self.green_max.to_be_bytes());
        b[8..10].copy_from_slice(&self.blue_max.to_be_bytes());
        b[10] = self.red_shift;
        b[11] = self.green_shift;
        b[12] = self.blue_shift;
        b
    }

    /// Convert one wire pixel to canonical RGBA.
    pub fn to_rgba(&self, px: &[u8]) -> [u8; 4] {
        let value: u32 = match (self.bytes_per_pixel(), self.big_endian) {
            (1, _) => u32::from(px[0]),
            (2, false) => u32::from(u16::from_le_bytes([px[0], px[1]])),
            (2, true) => u32::from(u16::from_be_bytes([px[0], px[1]])),
            (_, false) => u32::from_le_bytes([px[0], px[1], px[2], px[3]]),
            (_, true) => u32::from_be_bytes([px[0], px[1], px[2], px[3]]),
        };
        [
            channel(value, self.red_shift, self.red_max),
            channel(value, self.green_shift, self.green_max),
            channel(value, self.blue_shift, self.blue_max),
            255,
        ]
    }
}

fn channel(value: u32, shift: u8, max: u16) -> u8 {
    if max == 0 {
        return 0;
    }
    let raw = (value >> u32::from(shift)) & u32::from(max);
    if max == 255 {
        raw as u8
    } else {
        (raw * 255 / u32::from(max)) as u8
    }
}

#[derive(Debug, Clone)]
pub struct ServerInit {
    pub width: u16,
    pub height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
    pub version: ProtocolVersion,
}

async fn read_reason<S: AsyncRead + Unpin>(stream: &mut S) -> PilotResult<String> {
    let len = stream.read_u32().await?;
    if len > MAX_REASON_LEN {
        return Err(PilotError::Protocol(format!("reason string of {len} bytes")));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Run the RFB handshake up to and including ServerInit.
pub async fn handshake<S>(stream: &mut S, password: Option<&str>) -> PilotResult<ServerInit>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut banner = [0u8; 12];
    stream.read_exact(&mut banner).await?;
    let version = ProtocolVersion::negotiate(&banner)?;
    stream.write_all(version.banner()).await?;
    stream.flush().await?;
    tracing::debug!(?version, "RFB version negotiated");

    let security = match version {
        ProtocolVersion::V3_3 => {
            let ty = stream.read_u32().await?;
            if ty == 0 {
                let reason = read_reason(stream).await?;
                return Err(PilotError::Connect(format!("server refused connection: {reason}")));
            }
            u8::try_from(ty)
                .map_err(|_| PilotError::Protocol(format!("security type {ty}")))?
        }
        ProtocolVersion::V3_7 | ProtocolVersion::V3_8 => {
            let count = stream.read_u8().await?;
            if count == 0 {
                let reason = read_reason(stream).await?;
                return Err(PilotError::Connect(format!("server refused connection: {reason}")));
            }
            let mut offered = vec![0u8; usize::from(count)];
            stream.read_exact(&mut offered).await?;
            let chosen = if offered.contains(&SECURITY_NONE) {
                SECURITY_NONE
            } else if offered.contains(&SECURITY_VNC_AUTH) {
                SECURITY_VNC_AUTH
            } else {
                return Err(PilotError::Connect(format!(
                    "no supported security type in {offered:?}"
                )));
            };
            stream.write_u8(chosen).await?;
            stream.flush().await?;
            chosen
        }
    };

    match security {
        SECURITY_NONE => {}
        SECURITY_VNC_AUTH => {
            let password = password.ok_or_else(|| {
                PilotError::Connect("server requires a password but none is configured".into())
            })?;
            let mut challenge = [0u8; 16];
            stream.read_exact(&mut challenge).await?;
            let response = auth::vnc_auth_response(password, &challenge);
            stream.write_all(&response).await?;
            stream.flush().await?;
        }
        other => {
            return Err(PilotError::Connect(format!("unsupported security type {other}")));
        }
    }

    if version == ProtocolVersion::V3_8 || security == SECURITY_VNC_AUTH {
        let result = stream.read_u32().await?;
        if result != 0 {
            let reason = if version == ProtocolVersion::V3_8 {
                read_reason(stream).await.unwrap_or_default()
            } else {
                String::new()
            };
            return Err(PilotError::Connect(format!("authentication failed {reason}").trim().to_string()));
        }
    }

    // ClientInit: share the desktop with other viewers.
    stream.write_u8(1).await?;
    stream.flush().await?;

    let width = stream.read_u16().await?;
    let height = stream.read_u16().await?;
    let mut pf = [0u8; 16];
    stream.read_exact(&mut pf).await?;
    let name_len = stream.read_u32().await?;
    if name_len > MAX_NAME_LEN {
        return Err(PilotError::Protocol(format!("desktop name of {name_len} bytes")));
    }
    let mut name = vec![0u8; name_len as usize];
    stream.read_exact(&mut name).await?;

    Ok(ServerInit {
        width,
        height,
        pixel_format: PixelFormat::decode(&pf),
        name: String::from_utf8_lossy(&name).into_owned(),
        version,
    })
}

// ── Client → server messages ────────────────────────────────────────────────

pub fn set_pixel_format(format: &PixelFormat) -> [u8; 20] {
    let mut msg = [0u8; 20];
    msg[0] = 0;
    msg[4..20].copy_from_slice(&format.encode());
    msg
}

pub fn set_encodings(encodings: &[i32]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(4 + encodings.len() * 4);
    msg.push(2);
    msg.push(0);
    msg.extend_from_slice(&(encodings.len() as u16).to_be_bytes());
    for enc in encodings {
        msg.extend_from_slice(&enc.to_be_bytes());
    }
    msg
}

pub fn framebuffer_update_request(incremental: bool, x: u16, y: u16, w: u16, h: u16) -> [u8; 10] {
    let mut msg = [0u8; 10];
    msg[0] = 3;
    msg[1] = u8::from(incremental);
    msg[2..4].copy_from_slice(&x.to_be_bytes());
    msg[4..6].copy_from_slice(&y.to_be_bytes());
    msg[6..8].copy_from_slice(&w.to_be_bytes());
    msg[8..10].copy_from_slice(&h.to_be_bytes());
    msg
}

pub fn key_event(down: bool, keysym: u32) -> [u8; 8] {
    let mut msg = [0u8; 8];
    msg[0] = 4;
    msg[1] = u8::from(down);
    msg[4..8].copy_from_slice(&keysym.to_be_bytes());
    msg
}

pub fn pointer_event(button_mask: u8, x: u16, y: u16) -> [u8; 6] {
    let mut msg = [0u8; 6];
    msg[0] = 5;
    msg[1] = button_mask;
    msg[2..4].copy_from_slice(&x.to_be_bytes());
    msg[4..6].copy_from_slice(&y.to_be_bytes());
    msg
}

// ── Server → client messages ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RectBody {
    /// Pixels in the negotiated format, row-major.
    Raw(Vec<u8>),
    CopyRect { src_x: u16, src_y: u16 },
    /// The framebuffer was resized to the rectangle's width/height.
    DesktopSize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub body: RectBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    FramebufferUpdate(Vec<Rect>),
    SetColourMapEntries,
    Bell,
    ServerCutText,
}

pub async fn read_server_message<R>(r: &mut R, format: &PixelFormat) -> PilotResult<ServerMessage>
where
    R: AsyncRead + Unpin,
{
    match r.read_u8().await? {
        0 => {
            let _pad = r.read_u8().await?;
            let count = r.read_u16().await?;
            let mut rects = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                rects.push(read_rect(r, format).await?);
            }
            Ok(ServerMessage::FramebufferUpdate(rects))
        }
        1 => {
            let _pad = r.read_u8().await?;
            let _first = r.read_u16().await?;
            let colours = r.read_u16().await?;
            discard(r, u64::from(colours) * 6).await?;
            Ok(ServerMessage::SetColourMapEntries)
        }
        2 => Ok(ServerMessage::Bell),
        3 => {
            let mut pad = [0u8; 3];
            r.read_exact(&mut pad).await?;
            let len = r.read_u32().await?;
            discard(r, u64::from(len)).await?;
            Ok(ServerMessage::ServerCutText)
        }
        other => Err(PilotError::Protocol(format!("unknown server message type {other}"))),
    }
}

async fn read_rect<R: AsyncRead + Unpin>(r: &mut R, format: &PixelFormat) -> PilotResult<Rect> {
    let x = r.read_u16().await?;
    let y = r.read_u16().await?;
    let width = r.read_u16().await?;
    let height = r.read_u16().await?;
    let encoding = r.read_i32().await?;
    let body = match encoding {
        ENCODING_RAW => {
            let len = usize::from(width) * usize::from(height) * format.bytes_per_pixel();
            if len > MAX_RECT_BYTES {
                return Err(PilotError::Protocol(format!("raw rectangle of {len} bytes")));
            }
            let mut data = vec![0u8; len];
            r.read_exact(&mut data).await?;
            RectBody::Raw(data)
        }
        ENCODING_COPY_RECT => {
            let src_x = r.read_u16().await?;
            let src_y = r.read_u16().await?;
            RectBody::CopyRect { src_x, src_y }
        }
        ENCODING_DESKTOP_SIZE => RectBody::DesktopSize,
        other => {
            return Err(PilotError::Protocol(format!("unsupported encoding {other}")));
        }
    };
    Ok(Rect { x, y, width, height, body })
}

async fn discard<R: AsyncRead + Unpin>(r: &mut R, len: u64) -> PilotResult<()> {
    let copied = tokio::io::copy(&mut r.take(len), &mut tokio::io::sink()).await?;
    if copied < len {
        return Err(PilotError::Protocol("stream ended inside a message".into()));
    }
    Ok(())
}
