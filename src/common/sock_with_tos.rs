//! UDP socket with the "low delay" type of service bits set
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
    time::Duration,
};

use super::box_error::BoxError;

const TOS_LOW_DELAY: u32 = 0x10;

/// bind a datagram socket on every interface
///
/// The read timeout keeps whoever is receiving from blocking forever so it can get
/// on with its housekeeping.
pub fn new(port: u32, read_timeout: Option<Duration>) -> Result<UdpSocket, BoxError> {
    let raw_sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    raw_sock.set_tos(TOS_LOW_DELAY)?;
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port as u16);
    raw_sock.bind(&SockAddr::from(addr))?;
    raw_sock.set_read_timeout(read_timeout)?;
    Ok(UdpSocket::from(raw_sock))
}

#[cfg(test)]
mod test_sock_with_tos {
    use super::*;

    #[test]
    fn binds_any_port() {
        let sock = new(0, Some(Duration::from_millis(5))).unwrap();
        assert!(sock.local_addr().unwrap().port() > 0);
        let mut buf = [0u8; 16];
        // nothing is coming, so the timeout has to kick in
        assert!(sock.recv_from(&mut buf).is_err());
    }
}
