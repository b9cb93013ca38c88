//! Server information and player list queries against one endpoint

use crate::channel::DatagramChannel;
use crate::error::QueryError;
use log::debug;
use shared::{
    decode_info_response, decode_player_response, CodecError, InfoRequest, InfoResponse, Player,
    PlayerRequest, PlayerResponse, ServerInfo, NO_CHALLENGE,
};
use std::net::SocketAddr;
use std::time::Duration;

/// Challenge round trips tolerated before giving up on a query
const MAX_CHALLENGE_ROUNDS: usize = 2;

/// Speaks the A2S query protocol to a single server
///
/// Owns its [`DatagramChannel`]; the channel is released by [`close`]
/// or when the querier is dropped.
///
/// [`close`]: ServerQuerier::close
pub struct ServerQuerier {
    channel: DatagramChannel,
}

impl ServerQuerier {
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, QueryError> {
        let channel = DatagramChannel::connect(addr, timeout).await?;
        Ok(Self { channel })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.channel.peer_addr()
    }

    /// Fetches server information, answering a challenge if one is issued
    pub async fn fetch_info(&mut self) -> Result<ServerInfo, QueryError> {
        let mut request = InfoRequest::default();

        for _ in 0..MAX_CHALLENGE_ROUNDS {
            self.channel.send(&request.encode()).await?;
            let reply = self.channel.recv().await?;

            match decode_info_response(&reply)? {
                InfoResponse::Info(info) => return Ok(info),
                InfoResponse::Challenge(challenge) => {
                    debug!("{} issued info challenge {:#x}", self.peer_addr(), challenge);
                    request.challenge = Some(challenge);
                }
            }
        }

        Err(repeated_challenge())
    }

    /// Fetches the player list through the challenge handshake
    pub async fn fetch_players(&mut self) -> Result<Vec<Player>, QueryError> {
        let mut request = PlayerRequest {
            challenge: NO_CHALLENGE,
        };

        for _ in 0..MAX_CHALLENGE_ROUNDS {
            self.channel.send(&request.encode()).await?;
            let reply = self.channel.recv().await?;

            match decode_player_response(&reply)? {
                PlayerResponse::Players(players) => return Ok(players),
                PlayerResponse::Challenge(challenge) => {
                    debug!("{} issued player challenge {:#x}", self.peer_addr(), challenge);
                    request.challenge = challenge;
                }
            }
        }

        Err(repeated_challenge())
    }

    pub fn close(&mut self) {
        self.channel.close();
    }
}

fn repeated_challenge() -> QueryError {
    QueryError::Decode(CodecError::UnexpectedHeader {
        expected: shared::packets::S2A_INFO_SRC,
        got: shared::packets::S2C_CHALLENGE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use shared::packets::{A2S_INFO, A2S_PLAYER, S2A_INFO_SRC, S2A_PLAYER, S2C_CHALLENGE};
    use shared::{PacketBuilder, PacketReader};
    use tokio::net::UdpSocket;

    const CHALLENGE: i32 = 0x1234_5678;

    fn info_reply() -> Vec<u8> {
        let mut b = PacketBuilder::new();
        b.write_i32(-1);
        b.write_u8(S2A_INFO_SRC);
        b.write_u8(17);
        b.write_cstring("Test Server");
        b.write_cstring("cp_badlands");
        b.write_cstring("tf");
        b.write_cstring("Team Fortress");
        b.write_u16(440);
        b.write_u8(2);
        b.write_u8(24);
        b.write_u8(0);
        b.write_u8(b'd');
        b.write_u8(b'l');
        b.write_u8(0);
        b.write_u8(1);
        b.into_bytes()
    }

    fn challenge_reply() -> Vec<u8> {
        let mut b = PacketBuilder::new();
        b.write_i32(-1);
        b.write_u8(S2C_CHALLENGE);
        b.write_i32(CHALLENGE);
        b.into_bytes()
    }

    fn players_reply() -> Vec<u8> {
        let mut b = PacketBuilder::new();
        b.write_i32(-1);
        b.write_u8(S2A_PLAYER);
        b.write_u8(2);
        for (i, name) in ["scout", "medic"].iter().enumerate() {
            b.write_u8(i as u8);
            b.write_cstring(name);
            b.write_i32(10);
            b.write_f32(60.0);
        }
        b.into_bytes()
    }

    /// Replies like a server that demands a challenge for every query kind
    async fn challenging_server() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 1400];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let mut reader = PacketReader::new(&buf[..len]);
                let _ = reader.read_i32();
                let kind = reader.read_u8().unwrap_or(0);
                let reply = match kind {
                    A2S_INFO => {
                        let _ = reader.read_string();
                        match reader.read_i32() {
                            Ok(CHALLENGE) => info_reply(),
                            _ => challenge_reply(),
                        }
                    }
                    A2S_PLAYER => match reader.read_i32() {
                        Ok(CHALLENGE) => players_reply(),
                        _ => challenge_reply(),
                    },
                    _ => continue,
                };
                let _ = socket.send_to(&reply, peer).await;
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_fetch_info_answers_challenge() {
        let addr = challenging_server().await;
        let mut querier = ServerQuerier::connect(addr, Duration::from_secs(1))
            .await
            .unwrap();

        let info = querier.fetch_info().await.unwrap();
        assert_eq!(info.name, "Test Server");
        assert_eq!(info.map, "cp_badlands");
        assert_eq!(info.players, 2);
        querier.close();
    }

    #[tokio::test]
    async fn test_fetch_players_answers_challenge() {
        let addr = challenging_server().await;
        let mut querier = ServerQuerier::connect(addr, Duration::from_secs(1))
            .await
            .unwrap();

        let players = querier.fetch_players().await.unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[1].name, "medic");
    }

    #[tokio::test]
    async fn test_endless_challenges_fail() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1400];
            while let Ok((_, peer)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(&challenge_reply(), peer).await;
            }
        });

        let mut querier = ServerQuerier::connect(addr, Duration::from_secs(1))
            .await
            .unwrap();
        let err = querier.fetch_info().await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Decode);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        let mut querier = ServerQuerier::connect(addr, Duration::from_millis(100))
            .await
            .unwrap();
        let err = querier.fetch_info().await.unwrap_err();
        assert!(err.is_timeout());
        drop(socket);
    }

    #[tokio::test]
    async fn test_garbage_reply_is_decode_error() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1400];
            if let Ok((_, peer)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(b"\xff\xff\xff\xffI\x11truncated", peer).await;
            }
        });

        let mut querier = ServerQuerier::connect(addr, Duration::from_secs(1))
            .await
            .unwrap();
        let err = querier.fetch_info().await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::Decode(CodecError::UnterminatedString { .. })
        ));
    }
}
