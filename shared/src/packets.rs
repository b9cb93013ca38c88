//! Query protocol messages
//!
//! Requests are encoded with [`PacketBuilder`] and responses decoded with
//! [`PacketReader`]. Every datagram starts with a 32-bit prefix: `-1` for a
//! complete single-packet message, `-2` for one fragment of a split message.

use crate::codec::{CodecError, PacketBuilder, PacketReader};
use serde::Serialize;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Largest datagram the transport reads in one receive call
pub const MAX_PACKET_SIZE: usize = 1400;

pub const SINGLE_PACKET: i32 = -1;
pub const SPLIT_PACKET: i32 = -2;

pub const A2S_INFO: u8 = 0x54;
pub const A2S_INFO_PAYLOAD: &str = "Source Engine Query";
pub const A2S_PLAYER: u8 = 0x55;
pub const S2C_CHALLENGE: u8 = 0x41;
pub const S2A_INFO_SRC: u8 = 0x49;
pub const S2A_INFO_DETAILED: u8 = 0x6d;
pub const S2A_PLAYER: u8 = 0x44;

pub const MASTER_QUERY: u8 = 0x31;
pub const MASTER_REPLY: [u8; 2] = [0x66, 0x0a];
/// Region byte selecting every region in a master query
pub const REGION_ALL: u8 = 0xff;

/// Challenge value asking the server to issue a fresh challenge
pub const NO_CHALLENGE: i32 = -1;

const THE_SHIP_APP_ID: u16 = 2400;

const EDF_GAME_ID: u8 = 0x01;
const EDF_KEYWORDS: u8 = 0x20;
const EDF_SOURCE_TV: u8 = 0x40;
const EDF_STEAM_ID: u8 = 0x10;
const EDF_PORT: u8 = 0x80;

/// Kind of server process answering the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Dedicated,
    Listen,
    SourceTv,
    Unknown,
}

impl ServerType {
    fn from_byte(b: u8) -> Self {
        match b {
            b'd' | b'D' => ServerType::Dedicated,
            b'l' | b'L' => ServerType::Listen,
            b'p' | b'P' => ServerType::SourceTv,
            _ => ServerType::Unknown,
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerType::Dedicated => "dedicated",
            ServerType::Listen => "listen",
            ServerType::SourceTv => "sourcetv",
            ServerType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Operating system the server runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerOs {
    Linux,
    Windows,
    Mac,
    Unknown,
}

impl ServerOs {
    fn from_byte(b: u8) -> Self {
        match b {
            b'l' | b'L' => ServerOs::Linux,
            b'w' | b'W' => ServerOs::Windows,
            b'm' | b'o' => ServerOs::Mac,
            _ => ServerOs::Unknown,
        }
    }
}

impl fmt::Display for ServerOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerOs::Linux => "linux",
            ServerOs::Windows => "windows",
            ServerOs::Mac => "mac",
            ServerOs::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Fields carried by the optional extension block of an info reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedInfo {
    pub app_id: u32,
    pub game_version: String,
    pub port: u16,
    pub steam_id: u64,
    pub keywords: String,
    pub game_id: u64,
}

/// Decoded server information reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub protocol: u8,
    pub name: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
    pub server_type: ServerType,
    pub os: ServerOs,
    /// 0 for public servers, 1 for password protected ones
    pub visibility: u8,
    pub vac: u8,
    pub ext: Option<ExtendedInfo>,
}

/// One entry of a player list reply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    pub index: u8,
    pub name: String,
    pub score: i32,
    /// Seconds connected
    pub duration: f32,
}

/// Request for server information, optionally answering a challenge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfoRequest {
    pub challenge: Option<i32>,
}

impl InfoRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut builder = PacketBuilder::new();
        builder.write_i32(SINGLE_PACKET);
        builder.write_u8(A2S_INFO);
        builder.write_cstring(A2S_INFO_PAYLOAD);
        if let Some(challenge) = self.challenge {
            builder.write_i32(challenge);
        }
        builder.into_bytes()
    }
}

/// Request for the player list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerRequest {
    pub challenge: i32,
}

impl PlayerRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut builder = PacketBuilder::new();
        builder.write_i32(SINGLE_PACKET);
        builder.write_u8(A2S_PLAYER);
        builder.write_i32(self.challenge);
        builder.into_bytes()
    }
}

/// One page request to a master server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterRequest {
    pub region: u8,
    /// Last address of the previous page, `0.0.0.0:0` for the first one
    pub seed: SocketAddrV4,
    pub filter: String,
}

impl MasterRequest {
    pub fn first_page(filter: impl Into<String>) -> Self {
        Self {
            region: REGION_ALL,
            seed: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            filter: filter.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut builder = PacketBuilder::new();
        builder.write_u8(MASTER_QUERY);
        builder.write_u8(self.region);
        builder.write_cstring(&self.seed.to_string());
        builder.write_cstring(&self.filter);
        builder.into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoResponse {
    Info(ServerInfo),
    Challenge(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerResponse {
    Players(Vec<Player>),
    Challenge(i32),
}

/// Consumes the single-packet prefix and returns the message kind byte
fn read_header(reader: &mut PacketReader<'_>) -> Result<u8, CodecError> {
    match reader.read_i32()? {
        SINGLE_PACKET => reader.read_u8(),
        SPLIT_PACKET => Err(CodecError::SplitPacket),
        other => Err(CodecError::UnexpectedPrefix(other)),
    }
}

pub fn decode_info_response(packet: &[u8]) -> Result<InfoResponse, CodecError> {
    let mut reader = PacketReader::new(packet);
    match read_header(&mut reader)? {
        S2C_CHALLENGE => Ok(InfoResponse::Challenge(reader.read_i32()?)),
        S2A_INFO_SRC => decode_source_info(&mut reader).map(InfoResponse::Info),
        S2A_INFO_DETAILED => decode_goldsrc_info(&mut reader).map(InfoResponse::Info),
        got => Err(CodecError::UnexpectedHeader {
            expected: S2A_INFO_SRC,
            got,
        }),
    }
}

fn decode_source_info(reader: &mut PacketReader<'_>) -> Result<ServerInfo, CodecError> {
    let protocol = reader.read_u8()?;
    let name = reader.read_string()?;
    let map = reader.read_string()?;
    let folder = reader.read_string()?;
    let game = reader.read_string()?;
    let app_id = reader.read_u16()?;
    let players = reader.read_u8()?;
    let max_players = reader.read_u8()?;
    let bots = reader.read_u8()?;
    let server_type = ServerType::from_byte(reader.read_u8()?);
    let os = ServerOs::from_byte(reader.read_u8()?);
    let visibility = reader.read_u8()?;
    let vac = reader.read_u8()?;

    if app_id == THE_SHIP_APP_ID {
        // mode, witnesses, duration
        reader.slice(3)?;
    }

    let ext = if reader.more() {
        Some(decode_extended_info(reader, app_id)?)
    } else {
        None
    };

    Ok(ServerInfo {
        protocol,
        name,
        map,
        folder,
        game,
        players,
        max_players,
        bots,
        server_type,
        os,
        visibility,
        vac,
        ext,
    })
}

fn decode_extended_info(
    reader: &mut PacketReader<'_>,
    app_id: u16,
) -> Result<ExtendedInfo, CodecError> {
    let mut ext = ExtendedInfo {
        app_id: u32::from(app_id),
        game_version: reader.read_string()?,
        ..ExtendedInfo::default()
    };

    if !reader.more() {
        return Ok(ext);
    }

    let flags = reader.read_u8()?;
    if flags & EDF_PORT != 0 {
        ext.port = reader.read_u16()?;
    }
    if flags & EDF_STEAM_ID != 0 {
        ext.steam_id = reader.read_u64()?;
    }
    if flags & EDF_SOURCE_TV != 0 {
        reader.read_u16()?;
        reader.read_string()?;
    }
    if flags & EDF_KEYWORDS != 0 {
        ext.keywords = reader.read_string()?;
    }
    if flags & EDF_GAME_ID != 0 {
        ext.game_id = reader.read_u64()?;
        ext.app_id = (ext.game_id & 0x00ff_ffff) as u32;
    }

    Ok(ext)
}

fn decode_goldsrc_info(reader: &mut PacketReader<'_>) -> Result<ServerInfo, CodecError> {
    let _address = reader.read_string()?;
    let name = reader.read_string()?;
    let map = reader.read_string()?;
    let folder = reader.read_string()?;
    let game = reader.read_string()?;
    let players = reader.read_u8()?;
    let max_players = reader.read_u8()?;
    let protocol = reader.read_u8()?;
    let server_type = ServerType::from_byte(reader.read_u8()?);
    let os = ServerOs::from_byte(reader.read_u8()?);
    let visibility = reader.read_u8()?;

    if reader.read_u8()? == 1 {
        // link, download link, null byte, version, size, type, dll
        reader.read_string()?;
        reader.read_string()?;
        reader.slice(1)?;
        reader.read_i32()?;
        reader.read_i32()?;
        reader.slice(2)?;
    }

    let vac = reader.read_u8()?;
    let bots = reader.read_u8()?;

    Ok(ServerInfo {
        protocol,
        name,
        map,
        folder,
        game,
        players,
        max_players,
        bots,
        server_type,
        os,
        visibility,
        vac,
        ext: None,
    })
}

pub fn decode_player_response(packet: &[u8]) -> Result<PlayerResponse, CodecError> {
    let mut reader = PacketReader::new(packet);
    match read_header(&mut reader)? {
        S2C_CHALLENGE => Ok(PlayerResponse::Challenge(reader.read_i32()?)),
        S2A_PLAYER => Ok(PlayerResponse::Players(decode_players(&mut reader)?)),
        got => Err(CodecError::UnexpectedHeader {
            expected: S2A_PLAYER,
            got,
        }),
    }
}

/// Decodes the player list, keeping every entry read before a truncation
fn decode_players(reader: &mut PacketReader<'_>) -> Result<Vec<Player>, CodecError> {
    let count = reader.read_u8()?;
    let mut players = Vec::with_capacity(usize::from(count));

    for _ in 0..count {
        let Ok(index) = reader.read_u8() else { break };
        let Some(name) = reader.try_read_string() else { break };
        let (Ok(score), Ok(duration)) = (reader.read_i32(), reader.read_f32()) else {
            break;
        };
        players.push(Player {
            index,
            name,
            score,
            duration,
        });
    }

    Ok(players)
}

/// Decodes one master server page into its address entries
pub fn decode_master_response(packet: &[u8]) -> Result<Vec<SocketAddrV4>, CodecError> {
    let mut reader = PacketReader::new(packet);
    let kind = read_header(&mut reader)?;
    if kind != MASTER_REPLY[0] {
        return Err(CodecError::UnexpectedHeader {
            expected: MASTER_REPLY[0],
            got: kind,
        });
    }
    let marker = reader.read_u8()?;
    if marker != MASTER_REPLY[1] {
        return Err(CodecError::UnexpectedHeader {
            expected: MASTER_REPLY[1],
            got: marker,
        });
    }

    let mut addrs = Vec::with_capacity(reader.remaining() / 6);
    while reader.more() {
        let ip = reader.read_ipv4()?;
        let port = reader.read_port()?;
        addrs.push(SocketAddrV4::new(ip, port));
    }
    Ok(addrs)
}
