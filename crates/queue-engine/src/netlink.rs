//! Linux NFQUEUE 바인딩 -- raw `NETLINK_NETFILTER` 소켓
//!
//! 큐 하나마다 netlink 소켓 하나를 엽니다. 메시지 형식:
//!
//! ```text
//! nlmsghdr (16B, native endian) | nfgenmsg (4B, res_id = queue, big endian) | nlattr...
//! ```
//!
//! NFQUEUE 속성 값은 모두 big endian입니다. 커널 3.8 이후로는 PF 바인딩이
//! 필요 없으므로 큐 번호만 바인딩합니다.

use std::collections::VecDeque;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use tracing::{debug, warn};

use nfsieve_core::error::QueueError;
use nfsieve_core::queue::{PacketQueue, QueueBinder, QueueMessage, QueueSpec};
use nfsieve_core::types::Verdict;

// nfnetlink 서브시스템 / 메시지 타입
const NFNL_SUBSYS_QUEUE: u16 = 3;
const NFQNL_MSG_PACKET: u16 = 0;
const NFQNL_MSG_VERDICT: u16 = 1;
const NFQNL_MSG_CONFIG: u16 = 2;

// 설정 명령
const NFQNL_CFG_CMD_BIND: u8 = 1;
const NFQNL_CFG_CMD_UNBIND: u8 = 2;
const NFQNL_COPY_PACKET: u8 = 2;

// 설정 속성
const NFQA_CFG_CMD: u16 = 1;
const NFQA_CFG_PARAMS: u16 = 2;
const NFQA_CFG_QUEUE_MAXLEN: u16 = 3;
const NFQA_CFG_MASK: u16 = 4;
const NFQA_CFG_FLAGS: u16 = 5;
const NFQA_CFG_F_FAIL_OPEN: u32 = 1;

// 패킷/판정 속성
const NFQA_PACKET_HDR: u16 = 1;
const NFQA_VERDICT_HDR: u16 = 2;
const NFQA_PAYLOAD: u16 = 10;

const NF_DROP: u32 = 0;
const NF_ACCEPT: u32 = 1;

// netlink 헤더
const NLMSG_HDRLEN: usize = 16;
const NFGENMSG_LEN: usize = 4;
const NLMSG_ERROR: u16 = 2;
const NLM_F_REQUEST: u16 = 1;
const NLM_F_ACK: u16 = 4;
const NLA_TYPE_MASK: u16 = 0x3fff;

const RECV_HEADROOM: usize = 4096;
const SOCKET_RCVBUF: libc::c_int = 4 * 1024 * 1024;

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// NFQUEUE 큐 바인더
#[derive(Debug, Default)]
pub struct NetlinkBinder;

impl NetlinkBinder {
    pub fn new() -> Self {
        Self
    }
}

impl QueueBinder for NetlinkBinder {
    type Queue = NetlinkQueue;

    fn bind(&mut self, id: u16, spec: &QueueSpec) -> Result<NetlinkQueue, QueueError> {
        NetlinkQueue::open(id, spec)
    }
}

/// 커널이 전달한 패킷 하나
#[derive(Debug)]
pub struct NetlinkMessage {
    packet_id: u32,
    payload: Vec<u8>,
}

impl NetlinkMessage {
    /// 커널이 부여한 패킷 번호
    pub fn packet_id(&self) -> u32 {
        self.packet_id
    }
}

impl QueueMessage for NetlinkMessage {
    fn packet(&self) -> &[u8] {
        &self.payload
    }
}

/// 바인딩된 NFQUEUE 큐 하나
///
/// 드롭 시 바인딩을 해제하고 소켓을 닫습니다.
pub struct NetlinkQueue {
    fd: OwnedFd,
    id: u16,
    seq: u32,
    buf: Vec<u8>,
    /// 설정 응답을 기다리는 동안 도착한 패킷
    backlog: VecDeque<NetlinkMessage>,
}

impl NetlinkQueue {
    fn open(id: u16, spec: &QueueSpec) -> Result<Self, QueueError> {
        // SAFETY: 인자는 모두 상수이며 반환값은 아래에서 검사합니다.
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                libc::NETLINK_NETFILTER,
            )
        };
        if raw < 0 {
            return Err(QueueError::Open(format!(
                "netlink socket: {}",
                io::Error::last_os_error()
            )));
        }
        // SAFETY: `raw`는 방금 생성된 유효한 fd이며 소유권을 넘겨받습니다.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: sockaddr_nl은 0으로 초기화해도 유효한 POD 구조체입니다.
        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        // SAFETY: addr는 스택에 살아있고 길이는 구조체 크기와 일치합니다.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(QueueError::Open(format!(
                "netlink bind: {}",
                io::Error::last_os_error()
            )));
        }

        let mut queue = Self {
            fd,
            id,
            seq: 0,
            buf: vec![0u8; usize::from(spec.max_packet_size) + RECV_HEADROOM],
            backlog: VecDeque::new(),
        };
        queue.grow_receive_buffer();

        queue
            .request(
                NFQNL_MSG_CONFIG,
                &[(NFQA_CFG_CMD, &[NFQNL_CFG_CMD_BIND, 0, 0, 0][..])],
                true,
            )
            .map_err(|e| match e.raw_os_error() {
                Some(libc::EPERM) | Some(libc::EACCES) => {
                    QueueError::Open(format!("queue {id} bind: {e}"))
                }
                _ => QueueError::Busy {
                    id,
                    reason: e.to_string(),
                },
            })?;

        queue
            .configure(spec)
            .map_err(|e| QueueError::Open(format!("queue {id} configure: {e}")))?;

        debug!(queue_id = id, ?spec, "nfqueue bound");
        Ok(queue)
    }

    fn configure(&mut self, spec: &QueueSpec) -> io::Result<()> {
        let mut params = [0u8; 5];
        params[..4].copy_from_slice(&u32::from(spec.max_packet_size).to_be_bytes());
        params[4] = NFQNL_COPY_PACKET;
        let maxlen = spec.capacity.to_be_bytes();
        let fail_open = NFQA_CFG_F_FAIL_OPEN.to_be_bytes();

        let mut attrs: Vec<(u16, &[u8])> =
            vec![(NFQA_CFG_PARAMS, &params[..]), (NFQA_CFG_QUEUE_MAXLEN, &maxlen[..])];
        if spec.fail_open {
            attrs.push((NFQA_CFG_MASK, &fail_open[..]));
            attrs.push((NFQA_CFG_FLAGS, &fail_open[..]));
        }

        self.request(NFQNL_MSG_CONFIG, &attrs, true)
    }

    fn grow_receive_buffer(&self) {
        // SAFETY: 값 포인터와 길이가 c_int 하나를 정확히 가리킵니다.
        let rc = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &SOCKET_RCVBUF as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            debug!(
                queue_id = self.id,
                error = %io::Error::last_os_error(),
                "could not enlarge netlink receive buffer"
            );
        }
    }

    /// nfqueue 메시지를 보내고, `ack`이면 커널 응답을 기다립니다.
    fn request(&mut self, msg_type: u16, attrs: &[(u16, &[u8])], ack: bool) -> io::Result<()> {
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;

        let body_len: usize = attrs.iter().map(|(_, data)| align4(4 + data.len())).sum();
        let total = NLMSG_HDRLEN + NFGENMSG_LEN + body_len;
        let flags = if ack { NLM_F_REQUEST | NLM_F_ACK } else { NLM_F_REQUEST };

        let mut msg = Vec::with_capacity(total);
        msg.extend_from_slice(&(total as u32).to_ne_bytes());
        msg.extend_from_slice(&((NFNL_SUBSYS_QUEUE << 8) | msg_type).to_ne_bytes());
        msg.extend_from_slice(&flags.to_ne_bytes());
        msg.extend_from_slice(&seq.to_ne_bytes());
        msg.extend_from_slice(&0u32.to_ne_bytes());
        // nfgenmsg: AF_UNSPEC, NFNETLINK_V0, res_id
        msg.extend_from_slice(&[libc::AF_UNSPEC as u8, 0]);
        msg.extend_from_slice(&self.id.to_be_bytes());
        for (attr_type, data) in attrs {
            let len = 4 + data.len();
            msg.extend_from_slice(&(len as u16).to_ne_bytes());
            msg.extend_from_slice(&attr_type.to_ne_bytes());
            msg.extend_from_slice(data);
            msg.resize(msg.len() + align4(len) - len, 0);
        }

        self.send(&msg)?;

        if ack { self.wait_ack(seq) } else { Ok(()) }
    }

    fn send(&self, msg: &[u8]) -> io::Result<()> {
        // SAFETY: sockaddr_nl은 0으로 초기화해도 유효하며 nl_pid 0은 커널을 뜻합니다.
        let mut kernel: libc::sockaddr_nl = unsafe { mem::zeroed() };
        kernel.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        // SAFETY: msg와 kernel은 호출 동안 유효합니다.
        let sent = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                msg.as_ptr() as *const libc::c_void,
                msg.len(),
                0,
                &kernel as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn read(&mut self) -> io::Result<usize> {
        loop {
            // SAFETY: buf는 len 바이트 쓰기가 가능한 버퍼입니다.
            let n = unsafe {
                libc::recv(
                    self.fd.as_raw_fd(),
                    self.buf.as_mut_ptr() as *mut libc::c_void,
                    self.buf.len(),
                    0,
                )
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    fn wait_ack(&mut self, seq: u32) -> io::Result<()> {
        loop {
            let n = self.read()?;
            if let Some(result) = dispatch(&self.buf[..n], self.id, Some(seq), &mut self.backlog) {
                return result;
            }
        }
    }
}

impl PacketQueue for NetlinkQueue {
    type Message = NetlinkMessage;

    fn id(&self) -> u16 {
        self.id
    }

    fn recv(&mut self) -> Result<NetlinkMessage, QueueError> {
        loop {
            if let Some(message) = self.backlog.pop_front() {
                return Ok(message);
            }
            let n = self.read().map_err(|e| QueueError::Recv {
                id: self.id,
                reason: e.to_string(),
            })?;
            dispatch(&self.buf[..n], self.id, None, &mut self.backlog);
        }
    }

    fn verdict(&mut self, message: NetlinkMessage, verdict: Verdict) -> Result<(), QueueError> {
        let (code, replacement) = match &verdict {
            Verdict::Accept => (NF_ACCEPT, None),
            Verdict::AcceptWith(bytes) => (NF_ACCEPT, Some(bytes.as_ref())),
            Verdict::Drop => (NF_DROP, None),
        };

        let mut header = [0u8; 8];
        header[..4].copy_from_slice(&code.to_be_bytes());
        header[4..].copy_from_slice(&message.packet_id.to_be_bytes());

        let mut attrs: Vec<(u16, &[u8])> = vec![(NFQA_VERDICT_HDR, &header[..])];
        if let Some(bytes) = replacement {
            attrs.push((NFQA_PAYLOAD, bytes));
        }

        self.request(NFQNL_MSG_VERDICT, &attrs, false)
            .map_err(|e| QueueError::Verdict {
                id: self.id,
                reason: e.to_string(),
            })
    }
}

impl Drop for NetlinkQueue {
    fn drop(&mut self) {
        if let Err(e) = self.request(
            NFQNL_MSG_CONFIG,
            &[(NFQA_CFG_CMD, &[NFQNL_CFG_CMD_UNBIND, 0, 0, 0][..])],
            false,
        ) {
            debug!(queue_id = self.id, error = %e, "nfqueue unbind failed");
        }
    }
}

/// 수신한 netlink 데이터그램을 분류합니다.
///
/// 패킷은 `backlog`에 쌓고, `ack_seq`에 대한 응답을 만나면 그 결과를 반환합니다.
fn dispatch(
    buf: &[u8],
    queue_id: u16,
    ack_seq: Option<u32>,
    backlog: &mut VecDeque<NetlinkMessage>,
) -> Option<io::Result<()>> {
    let packet_type = (NFNL_SUBSYS_QUEUE << 8) | NFQNL_MSG_PACKET;
    let mut result = None;
    let mut offset = 0;

    while offset + NLMSG_HDRLEN <= buf.len() {
        let len = u32::from_ne_bytes([
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ]) as usize;
        if len < NLMSG_HDRLEN || offset + len > buf.len() {
            warn!(queue_id, len, "malformed netlink message");
            break;
        }
        let msg_type = u16::from_ne_bytes([buf[offset + 4], buf[offset + 5]]);
        let seq = u32::from_ne_bytes([
            buf[offset + 8],
            buf[offset + 9],
            buf[offset + 10],
            buf[offset + 11],
        ]);
        let body = &buf[offset + NLMSG_HDRLEN..offset + len];

        if msg_type == packet_type {
            match parse_packet(body) {
                Some(message) => backlog.push_back(message),
                None => warn!(queue_id, "nfqueue packet message without id or payload"),
            }
        } else if msg_type == NLMSG_ERROR && body.len() >= 4 {
            let code = i32::from_ne_bytes([body[0], body[1], body[2], body[3]]);
            if ack_seq == Some(seq) {
                result = Some(if code == 0 {
                    Ok(())
                } else {
                    Err(io::Error::from_raw_os_error(-code))
                });
            } else if code != 0 {
                warn!(
                    queue_id,
                    seq,
                    error = %io::Error::from_raw_os_error(-code),
                    "netlink request failed"
                );
            }
        }

        offset += align4(len);
    }

    result
}

fn parse_packet(body: &[u8]) -> Option<NetlinkMessage> {
    let mut offset = NFGENMSG_LEN;
    let mut packet_id = None;
    let mut payload = None;

    while offset + 4 <= body.len() {
        let len = usize::from(u16::from_ne_bytes([body[offset], body[offset + 1]]));
        let attr_type = u16::from_ne_bytes([body[offset + 2], body[offset + 3]]) & NLA_TYPE_MASK;
        if len < 4 || offset + len > body.len() {
            break;
        }
        let data = &body[offset + 4..offset + len];

        match attr_type {
            NFQA_PACKET_HDR if data.len() >= 4 => {
                packet_id = Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
            }
            NFQA_PAYLOAD => payload = Some(data.to_vec()),
            _ => {}
        }

        offset += align4(len);
    }

    Some(NetlinkMessage {
        packet_id: packet_id?,
        payload: payload.unwrap_or_default(),
    })
}
