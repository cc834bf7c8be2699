//! TCP 종료 세그먼트 합성
//!
//! 거부된 TCP 패킷을 그대로 drop하면 양 끝단은 재전송을 반복합니다.
//! 대신 원본의 IP/TCP 헤더(옵션 포함)만 남기고 페이로드를 제거한 뒤
//! FIN|ACK를 세워 보내면 수신 측이 연결을 정상 종료합니다.
//!
//! 수정 항목:
//! - TCP 플래그: FIN=1, ACK=1, SYN=0, RST=0 (나머지는 유지)
//! - IPv4 total length / IPv6 payload length
//! - IPv4 헤더 체크섬, TCP 체크섬 (원본 주소의 의사 헤더 사용)

use bytes::Bytes;

use crate::error::{PacketError, TeardownError};
use crate::packet::{self, IpVersion, ParsedPacket, Transport};

/// TCP 플래그 비트
pub const TCP_FIN: u8 = 0x01;
pub const TCP_SYN: u8 = 0x02;
pub const TCP_RST: u8 = 0x04;
pub const TCP_ACK: u8 = 0x10;

const IPV4_MORE_FRAGMENTS: u8 = 0x20;

/// 원시 패킷을 해석한 뒤 종료 세그먼트를 만듭니다.
pub fn teardown(packet: &[u8]) -> Result<Bytes, TeardownError> {
    let parsed = packet::parse(packet)?;
    build_teardown(packet, &parsed)
}

/// 이미 해석된 패킷으로 종료 세그먼트를 만듭니다.
pub fn build_teardown(packet: &[u8], parsed: &ParsedPacket) -> Result<Bytes, TeardownError> {
    if parsed.transport != Transport::Tcp {
        return Err(TeardownError::NotTcp);
    }

    let headers_len = parsed.headers_len();
    let mut out = packet
        .get(..headers_len)
        .ok_or(PacketError::Truncated {
            layer: "tcp",
            needed: headers_len,
            available: packet.len(),
        })?
        .to_vec();

    let tcp = parsed.transport_offset();
    out[tcp + 13] = (out[tcp + 13] | TCP_FIN | TCP_ACK) & !(TCP_SYN | TCP_RST);

    match parsed.version {
        IpVersion::V4 => {
            // 조각의 첫 부분이었더라도 결과는 완결된 패킷
            out[6] &= !IPV4_MORE_FRAGMENTS;
            out[2..4].copy_from_slice(&(headers_len as u16).to_be_bytes());
            out[10..12].fill(0);
            let csum = packet::ipv4_header_checksum(&out[..parsed.network_len]);
            out[10..12].copy_from_slice(&csum.to_be_bytes());
        }
        IpVersion::V6 => {
            if parsed.fragmented {
                return Err(TeardownError::Fragmented);
            }
            let payload_len = (headers_len - 40) as u16;
            out[4..6].copy_from_slice(&payload_len.to_be_bytes());
        }
    }

    out[tcp + 16..tcp + 18].fill(0);
    let csum = packet::transport_checksum(parsed.src, parsed.dst, packet::PROTO_TCP, &out[tcp..]);
    out[tcp + 16..tcp + 18].copy_from_slice(&csum.to_be_bytes());

    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    use crate::packet::{PROTO_TCP, PROTO_UDP, transport_checksum};

    fn ipv4_tcp(flags: u8, tcp_options: &[u8], payload: &[u8]) -> Vec<u8> {
        let doff = 20 + tcp_options.len();
        let total = 20 + doff + payload.len();
        let mut p = vec![0u8; 20];
        p[0] = 0x45;
        p[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        p[8] = 64;
        p[9] = PROTO_TCP;
        p[12..16].copy_from_slice(&[192, 168, 0, 10]);
        p[16..20].copy_from_slice(&[192, 168, 0, 20]);
        let mut tcp = vec![0u8; 20];
        tcp[0..2].copy_from_slice(&51000u16.to_be_bytes());
        tcp[2..4].copy_from_slice(&443u16.to_be_bytes());
        tcp[4..8].copy_from_slice(&1000u32.to_be_bytes());
        tcp[8..12].copy_from_slice(&2000u32.to_be_bytes());
        tcp[12] = ((doff / 4) as u8) << 4;
        tcp[13] = flags;
        tcp[14..16].copy_from_slice(&65535u16.to_be_bytes());
        p.extend_from_slice(&tcp);
        p.extend_from_slice(tcp_options);
        p.extend_from_slice(payload);
        p
    }

    fn ipv6_tcp(flags: u8, payload: &[u8]) -> Vec<u8> {
        let mut p = vec![0u8; 40];
        p[0] = 0x60;
        p[4..6].copy_from_slice(&((20 + payload.len()) as u16).to_be_bytes());
        p[6] = PROTO_TCP;
        p[7] = 64;
        p[8..24].copy_from_slice(&"2001:db8::1".parse::<Ipv6Addr>().unwrap().octets());
        p[24..40].copy_from_slice(&"2001:db8::2".parse::<Ipv6Addr>().unwrap().octets());
        let mut tcp = vec![0u8; 20];
        tcp[12] = 5 << 4;
        tcp[13] = flags;
        p.extend_from_slice(&tcp);
        p.extend_from_slice(payload);
        p
    }

    fn verify_tcp_checksum(segment: &[u8]) {
        let parsed = packet::parse(segment).unwrap();
        let tcp = &segment[parsed.transport_offset()..];
        assert_eq!(
            transport_checksum(parsed.src, parsed.dst, PROTO_TCP, tcp),
            0,
            "tcp checksum does not verify"
        );
    }

    #[test]
    fn ipv4_segment_is_fin_ack_without_payload() {
        let pkt = ipv4_tcp(0x18, &[], b"GET /bad HTTP/1.1\r\n\r\n");
        let out = teardown(&pkt).unwrap();

        assert_eq!(out.len(), 40);
        assert_eq!(u16::from_be_bytes([out[2], out[3]]), 40);
        assert_eq!(out[33], TCP_FIN | TCP_ACK | 0x08);
        assert_eq!(packet::ipv4_header_checksum(&out[..20]), 0);
        verify_tcp_checksum(&out);

        // 시퀀스 번호와 포트는 유지
        assert_eq!(&out[20..32], &pkt[20..32]);
    }

    #[test]
    fn syn_and_rst_are_cleared() {
        let pkt = ipv4_tcp(TCP_SYN | TCP_RST | 0x20, &[], b"x");
        let out = teardown(&pkt).unwrap();
        assert_eq!(out[33], TCP_FIN | TCP_ACK | 0x20);
    }

    #[test]
    fn tcp_options_are_preserved() {
        let options = [1, 1, 8, 10, 0, 0, 0, 1, 0, 0, 0, 2];
        let pkt = ipv4_tcp(0x10, &options, b"payload");
        let out = teardown(&pkt).unwrap();

        assert_eq!(out.len(), 20 + 32);
        assert_eq!(&out[40..52], &options);
        assert_eq!(u16::from_be_bytes([out[2], out[3]]), 52);
        verify_tcp_checksum(&out);
    }

    #[test]
    fn ipv6_segment_has_correct_payload_length() {
        let pkt = ipv6_tcp(0x18, b"secret data");
        let out = teardown(&pkt).unwrap();

        assert_eq!(out.len(), 60);
        assert_eq!(u16::from_be_bytes([out[4], out[5]]), 20);
        assert_eq!(out[53], TCP_FIN | TCP_ACK | 0x08);
        verify_tcp_checksum(&out);
    }

    #[test]
    fn first_fragment_loses_more_fragments_flag() {
        let mut pkt = ipv4_tcp(0x18, &[], b"abc");
        pkt[6] = 0x20;
        let out = teardown(&pkt).unwrap();
        assert_eq!(out[6] & 0x20, 0);
        assert_eq!(packet::ipv4_header_checksum(&out[..20]), 0);
    }

    #[test]
    fn udp_is_rejected() {
        let mut pkt = ipv4_tcp(0, &[], b"");
        pkt[9] = PROTO_UDP;
        // UDP 길이 필드
        pkt[24..26].copy_from_slice(&20u16.to_be_bytes());
        assert!(matches!(teardown(&pkt), Err(TeardownError::NotTcp)));
    }

    #[test]
    fn truncated_packet_is_reported() {
        let pkt = ipv4_tcp(0x18, &[], b"data");
        assert!(matches!(
            teardown(&pkt[..30]),
            Err(TeardownError::Packet(PacketError::Truncated { .. }))
        ));
    }
}
