//! 네트워크/전송 계층 헤더 파서
//!
//! NFQUEUE는 링크 계층 없이 IP 헤더부터 전달합니다. [`parse`]는 IPv4(옵션 포함)와
//! IPv6(확장 헤더 포함) 위의 TCP/UDP 헤더를 해석하여 페이로드 구간을 찾습니다.
//! 바이트를 복사하지 않고 오프셋만 기록합니다.
//!
//! 체크섬 함수는 RFC 1071 one's-complement 합을 사용합니다.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::Range;

use crate::error::PacketError;

/// IP 프로토콜 번호: TCP
pub const PROTO_TCP: u8 = 6;
/// IP 프로토콜 번호: UDP
pub const PROTO_UDP: u8 = 17;

const IPV4_MIN_HEADER: usize = 20;
const IPV6_HEADER: usize = 40;
const TCP_MIN_HEADER: usize = 20;
const UDP_HEADER: usize = 8;

// IPv6 확장 헤더
const EXT_HOP_BY_HOP: u8 = 0;
const EXT_ROUTING: u8 = 43;
const EXT_FRAGMENT: u8 = 44;
const EXT_DEST_OPTS: u8 = 60;

/// IP 버전
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

/// 전송 계층 프로토콜
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    /// IP 프로토콜 번호
    pub fn protocol(&self) -> u8 {
        match self {
            Self::Tcp => PROTO_TCP,
            Self::Udp => PROTO_UDP,
        }
    }
}

/// 해석된 패킷의 헤더 배치
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacket {
    pub version: IpVersion,
    /// IP 헤더 + 확장 헤더 길이 (= 전송 계층 헤더 오프셋)
    pub network_len: usize,
    /// IP 헤더가 선언한 전체 길이 (패딩 제외)
    pub total_len: usize,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub transport: Transport,
    /// 전송 계층 헤더 길이 (TCP 옵션 포함)
    pub transport_len: usize,
    /// 페이로드 바이트 구간
    pub payload: Range<usize>,
    /// 뒤에 조각이 더 있는 첫 조각
    pub fragmented: bool,
}

impl ParsedPacket {
    /// 전송 계층 헤더 시작 오프셋
    pub fn transport_offset(&self) -> usize {
        self.network_len
    }

    /// 헤더 끝 (= 페이로드 시작) 오프셋
    pub fn headers_len(&self) -> usize {
        self.network_len + self.transport_len
    }

    /// 원본 바이트에서 페이로드를 잘라냅니다.
    pub fn payload<'a>(&self, packet: &'a [u8]) -> &'a [u8] {
        packet.get(self.payload.clone()).unwrap_or_default()
    }
}

/// 원시 IP 패킷을 해석합니다.
pub fn parse(packet: &[u8]) -> Result<ParsedPacket, PacketError> {
    let first = *packet.first().ok_or(PacketError::Truncated {
        layer: "ip",
        needed: 1,
        available: 0,
    })?;

    match first >> 4 {
        4 => parse_ipv4(packet),
        6 => parse_ipv6(packet),
        other => Err(PacketError::UnsupportedVersion(other)),
    }
}

fn parse_ipv4(packet: &[u8]) -> Result<ParsedPacket, PacketError> {
    ensure_len("ipv4", packet, IPV4_MIN_HEADER)?;

    let ihl = usize::from(packet[0] & 0x0f) * 4;
    if ihl < IPV4_MIN_HEADER {
        return Err(PacketError::BadLength {
            layer: "ipv4",
            value: ihl,
        });
    }
    ensure_len("ipv4", packet, ihl)?;

    let total_len = usize::from(read_u16(packet, 2));
    if total_len < ihl {
        return Err(PacketError::BadLength {
            layer: "ipv4",
            value: total_len,
        });
    }
    ensure_len("ipv4", packet, total_len)?;

    let flags_frag = read_u16(packet, 6);
    if flags_frag & 0x1fff != 0 {
        return Err(PacketError::Fragment);
    }
    let more_fragments = flags_frag & 0x2000 != 0;

    let src = IpAddr::V4(Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]));
    let dst = IpAddr::V4(Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]));

    finish(
        &packet[..total_len],
        IpVersion::V4,
        ihl,
        packet[9],
        src,
        dst,
        more_fragments,
    )
}

fn parse_ipv6(packet: &[u8]) -> Result<ParsedPacket, PacketError> {
    ensure_len("ipv6", packet, IPV6_HEADER)?;

    let total_len = IPV6_HEADER + usize::from(read_u16(packet, 4));
    ensure_len("ipv6", packet, total_len)?;
    let packet = &packet[..total_len];

    let src = IpAddr::V6(Ipv6Addr::from(read_array::<16>(packet, 8)));
    let dst = IpAddr::V6(Ipv6Addr::from(read_array::<16>(packet, 24)));

    let mut next = packet[6];
    let mut offset = IPV6_HEADER;
    let mut fragmented = false;

    loop {
        match next {
            EXT_HOP_BY_HOP | EXT_ROUTING | EXT_DEST_OPTS => {
                ensure_len("ipv6 extension", packet, offset + 8)?;
                let len = (usize::from(packet[offset + 1]) + 1) * 8;
                ensure_len("ipv6 extension", packet, offset + len)?;
                next = packet[offset];
                offset += len;
            }
            EXT_FRAGMENT => {
                ensure_len("ipv6 fragment", packet, offset + 8)?;
                let frag = read_u16(packet, offset + 2);
                if frag >> 3 != 0 {
                    return Err(PacketError::Fragment);
                }
                fragmented = frag & 0x0001 != 0;
                next = packet[offset];
                offset += 8;
            }
            _ => break,
        }
    }

    finish(packet, IpVersion::V6, offset, next, src, dst, fragmented)
}

/// 전송 계층 헤더를 해석합니다. `packet`은 IP 전체 길이로 잘린 상태입니다.
fn finish(
    packet: &[u8],
    version: IpVersion,
    network_len: usize,
    protocol: u8,
    src: IpAddr,
    dst: IpAddr,
    fragmented: bool,
) -> Result<ParsedPacket, PacketError> {
    let total_len = packet.len();

    let (transport, transport_len, payload_end) = match protocol {
        PROTO_TCP => {
            ensure_len("tcp", packet, network_len + TCP_MIN_HEADER)?;
            let data_offset = usize::from(packet[network_len + 12] >> 4) * 4;
            if data_offset < TCP_MIN_HEADER {
                return Err(PacketError::BadLength {
                    layer: "tcp",
                    value: data_offset,
                });
            }
            ensure_len("tcp", packet, network_len + data_offset)?;
            (Transport::Tcp, data_offset, total_len)
        }
        PROTO_UDP => {
            ensure_len("udp", packet, network_len + UDP_HEADER)?;
            let udp_len = usize::from(read_u16(packet, network_len + 4));
            if udp_len < UDP_HEADER {
                return Err(PacketError::BadLength {
                    layer: "udp",
                    value: udp_len,
                });
            }
            ensure_len("udp", packet, network_len + udp_len)?;
            (Transport::Udp, UDP_HEADER, network_len + udp_len)
        }
        other => return Err(PacketError::UnsupportedProtocol(other)),
    };

    Ok(ParsedPacket {
        version,
        network_len,
        total_len,
        src,
        dst,
        transport,
        transport_len,
        payload: network_len + transport_len..payload_end,
        fragmented,
    })
}

fn ensure_len(layer: &'static str, packet: &[u8], needed: usize) -> Result<(), PacketError> {
    if packet.len() < needed {
        return Err(PacketError::Truncated {
            layer,
            needed,
            available: packet.len(),
        });
    }
    Ok(())
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn read_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

// ─── 체크섬 ────────────────────────────────────────────────────────

/// 16비트 big-endian 워드 합을 누적합니다 (홀수 길이는 0으로 패딩).
pub fn checksum_add(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum = sum.wrapping_add(u32::from(u16::from_be_bytes([pair[0], pair[1]])));
    }
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add(u32::from(*last) << 8);
    }
    sum
}

/// 누적 합을 접어 one's-complement 체크섬으로 만듭니다.
pub fn checksum_fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// IPv4 헤더 체크섬 (체크섬 필드는 0이어야 함)
pub fn ipv4_header_checksum(header: &[u8]) -> u16 {
    checksum_fold(checksum_add(0, header))
}

/// 의사 헤더를 포함한 전송 계층 체크섬
///
/// `segment`의 체크섬 필드는 0이어야 합니다. 주소 버전이 서로 다르면
/// 의사 헤더는 각 주소의 바이트를 그대로 사용합니다.
pub fn transport_checksum(src: IpAddr, dst: IpAddr, protocol: u8, segment: &[u8]) -> u16 {
    let mut sum = 0u32;
    sum = match src {
        IpAddr::V4(addr) => checksum_add(sum, &addr.octets()),
        IpAddr::V6(addr) => checksum_add(sum, &addr.octets()),
    };
    sum = match dst {
        IpAddr::V4(addr) => checksum_add(sum, &addr.octets()),
        IpAddr::V6(addr) => checksum_add(sum, &addr.octets()),
    };

    let len = segment.len() as u32;
    sum = match src {
        // IPv4: zero, protocol, 16비트 길이
        IpAddr::V4(_) => sum
            .wrapping_add(u32::from(protocol))
            .wrapping_add(len & 0xffff),
        // IPv6: 32비트 길이, 24비트 zero, next header
        IpAddr::V6(_) => sum
            .wrapping_add(len >> 16)
            .wrapping_add(len & 0xffff)
            .wrapping_add(u32::from(protocol)),
    };

    checksum_fold(checksum_add(sum, segment))
}
