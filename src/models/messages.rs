use actix::Message;
use serde::{Deserialize, Serialize};

use crate::game::{Color, FogOfWar, Move, PieceType, Square, TimerMode};
use crate::models::room::{GameMode, Player, RoomStatus, Winner};

/// Text frame pushed to one connected session.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SessionMessage(pub String);

/// A move as submitted over the wire. Everything except source, destination
/// and promotion choice is derived server-side.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMoveRequest {
    pub from: Square,
    pub to: Square,
    #[serde(default)]
    pub promotion: Option<PieceType>,
}

/// Client-to-server events, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        room_name: String,
        player_name: String,
        #[serde(default)]
        timer_mode: Option<TimerMode>,
        #[serde(default)]
        game_mode: Option<GameMode>,
        #[serde(default)]
        user_id: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        player_name: String,
        #[serde(default)]
        user_id: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    MakeMove {
        room_id: String,
        #[serde(rename = "move")]
        mv: WireMoveRequest,
    },
    #[serde(rename_all = "camelCase")]
    GetLegalMoves { room_id: String, square: Square },
    #[serde(rename_all = "camelCase")]
    RequestUndo { room_id: String },
    #[serde(rename_all = "camelCase")]
    RespondUndo { room_id: String, accepted: bool },
    #[serde(rename_all = "camelCase")]
    RequestDraw { room_id: String },
    #[serde(rename_all = "camelCase")]
    RespondDraw { room_id: String, accepted: bool },
    #[serde(rename_all = "camelCase")]
    Surrender { room_id: String },
    #[serde(rename_all = "camelCase")]
    ReportTimeout { room_id: String, player: Color },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: String },
    #[serde(rename_all = "camelCase")]
    TimeSync { room_id: String },
}

/// Server-to-client events, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    RoomCreated { room: RoomView },
    #[serde(rename_all = "camelCase")]
    RoomJoined { room: RoomView, player: PlayerView },
    #[serde(rename_all = "camelCase")]
    PlayerJoined { player: PlayerView, room: RoomView },
    #[serde(rename_all = "camelCase")]
    PlayerLeft { player_id: String },
    #[serde(rename_all = "camelCase")]
    GameUpdated { game_state: GameStateView },
    #[serde(rename_all = "camelCase")]
    MoveMade {
        #[serde(rename = "move")]
        mv: Move,
        game_state: GameStateView,
    },
    #[serde(rename_all = "camelCase")]
    LegalMoves { square: Square, moves: Vec<String> },
    #[serde(rename_all = "camelCase")]
    UndoRequested {
        from_player: String,
        attempts_left: u8,
    },
    #[serde(rename_all = "camelCase")]
    UndoResponse { accepted: bool },
    #[serde(rename_all = "camelCase")]
    UndoExecuted { game_state: GameStateView },
    #[serde(rename_all = "camelCase")]
    DrawRequested { from_player: String },
    #[serde(rename_all = "camelCase")]
    DrawResponse { accepted: bool },
    #[serde(rename_all = "camelCase")]
    ClockUpdate { clocks: ClocksView },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub color: Color,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        PlayerView {
            id: player.id.clone(),
            name: player.name.clone(),
            color: player.color,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClocksView {
    pub white: u64,
    pub black: u64,
    pub increment: u64,
    pub mode: TimerMode,
}

/// Full game snapshot as broadcast to clients. The export string and both
/// fog masks go to both sides; masking down to one side's view is the
/// client's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub board: String,
    pub current_player: Color,
    pub game_status: RoomStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    pub move_history: Vec<Move>,
    pub fog_of_war: FogOfWar,
    pub timeout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clocks: Option<ClocksView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: String,
    pub name: String,
    pub players: Vec<PlayerView>,
    pub game_state: GameStateView,
    pub timer_mode: TimerMode,
    pub game_mode: GameMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_kebab_and_camel() {
        let parsed: ClientEvent = serde_json::from_str(
            r#"{"type":"create-room","roomName":"lobby","playerName":"ada","timerMode":"rapid","gameMode":"ai"}"#,
        )
        .unwrap();
        match parsed {
            ClientEvent::CreateRoom {
                room_name,
                player_name,
                timer_mode,
                game_mode,
                user_id,
            } => {
                assert_eq!(room_name, "lobby");
                assert_eq!(player_name, "ada");
                assert_eq!(timer_mode, Some(TimerMode::Rapid));
                assert_eq!(game_mode, Some(GameMode::Ai));
                assert_eq!(user_id, None);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn move_payload_parses_squares_and_promotion() {
        let parsed: ClientEvent = serde_json::from_str(
            r#"{"type":"make-move","roomId":"r1","move":{"from":"e7","to":"e8","promotion":"q"}}"#,
        )
        .unwrap();
        match parsed {
            ClientEvent::MakeMove { room_id, mv } => {
                assert_eq!(room_id, "r1");
                assert_eq!(mv.from, Square::from_algebraic("e7").unwrap());
                assert_eq!(mv.to, Square::from_algebraic("e8").unwrap());
                assert_eq!(mv.promotion, Some(PieceType::Queen));
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn bad_square_is_a_parse_error() {
        let parsed: Result<ClientEvent, _> = serde_json::from_str(
            r#"{"type":"make-move","roomId":"r1","move":{"from":"z9","to":"e4"}}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn server_error_event_shape() {
        let json = serde_json::to_string(&ServerEvent::Error {
            message: "Room not found".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"error","message":"Room not found"}"#);
    }

    #[test]
    fn move_record_omits_empty_fields() {
        let mv = Move {
            from: Square::from_algebraic("g1").unwrap(),
            to: Square::from_algebraic("f3").unwrap(),
            piece: PieceType::Knight,
            captured: None,
            promotion: None,
            timestamp: 42,
            color: Color::White,
        };
        let json = serde_json::to_string(&mv).unwrap();
        assert_eq!(
            json,
            r#"{"from":"g1","to":"f3","piece":"n","timestamp":42,"player":"white"}"#
        );
    }
}
