use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::game::TimerMode;
use crate::models::messages::RoomView;
use crate::models::room::{GameMode, Player, Room};
use crate::storage::{GameArchiver, RoomStore};

/// All live rooms. Each room sits behind its own lock so a slow game never
/// stalls the rest of the server; the registry lock only guards the map.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Arc<Mutex<Room>>>>,
    store: Arc<dyn RoomStore>,
    archiver: Arc<dyn GameArchiver>,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn RoomStore>, archiver: Arc<dyn GameArchiver>) -> Self {
        RoomRegistry {
            rooms: Mutex::new(HashMap::new()),
            store,
            archiver,
        }
    }

    /// Creates a room with its creator seated on white and returns the room
    /// handle together with the seated player.
    pub fn create_room(
        &self,
        room_name: String,
        player_name: String,
        session_id: String,
        user_id: Option<i64>,
        timer_mode: TimerMode,
        game_mode: GameMode,
    ) -> (Arc<Mutex<Room>>, Player) {
        let mut room = Room::new(
            room_name,
            timer_mode,
            game_mode,
            Arc::clone(&self.store),
            Arc::clone(&self.archiver),
        );
        let player = room.seat_creator(player_name, session_id, user_id);
        let room_id = room.id.clone();
        info!(
            "Created room {} ({:?}, {:?}) for {}",
            room_id, timer_mode, game_mode, player.name
        );
        let handle = Arc::new(Mutex::new(room));
        self.rooms
            .lock()
            .unwrap()
            .insert(room_id, Arc::clone(&handle));
        (handle, player)
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.lock().unwrap().get(room_id).cloned()
    }

    /// Tears the room down if it still has no connected player. The check
    /// and the removal happen under the map lock, and the room is marked
    /// closed under its own lock, so a join racing the teardown either
    /// lands first and keeps the room alive or finds no room at all.
    pub fn remove_if_empty(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.lock().unwrap();
        let handle = match rooms.get(room_id) {
            Some(handle) => Arc::clone(handle),
            None => return false,
        };
        {
            let mut room = handle.lock().unwrap();
            if room.human_count() > 0 {
                return false;
            }
            room.mark_closed();
        }
        rooms.remove(room_id);
        drop(rooms);
        if let Err(err) = self.store.delete_room(room_id) {
            warn!("Failed to delete stored room {}: {}", room_id, err);
        }
        info!("Removed empty room {}", room_id);
        true
    }

    /// Drops every room without a connected player. Runs periodically so
    /// rooms abandoned without a leave message do not pile up.
    pub fn sweep_empty(&self) -> usize {
        let candidates: Vec<String> = {
            let rooms = self.rooms.lock().unwrap();
            rooms
                .iter()
                .filter(|(_, handle)| handle.lock().unwrap().human_count() == 0)
                .map(|(id, _)| id.clone())
                .collect()
        };
        candidates
            .iter()
            .filter(|id| self.remove_if_empty(id))
            .count()
    }

    pub fn room_views(&self) -> Vec<RoomView> {
        let handles: Vec<Arc<Mutex<Room>>> =
            self.rooms.lock().unwrap().values().cloned().collect();
        handles
            .iter()
            .map(|handle| handle.lock().unwrap().room_view())
            .collect()
    }

    /// Handles of every room the given session is seated in, for
    /// disconnect cleanup.
    pub fn rooms_for_session(&self, session_id: &str) -> Vec<(String, Arc<Mutex<Room>>)> {
        let handles: Vec<(String, Arc<Mutex<Room>>)> = self
            .rooms
            .lock()
            .unwrap()
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();
        handles
            .into_iter()
            .filter(|(_, handle)| handle.lock().unwrap().contains_session(session_id))
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LogArchiver, MemoryRoomStore};

    fn registry() -> RoomRegistry {
        RoomRegistry::new(Arc::new(MemoryRoomStore::new()), Arc::new(LogArchiver))
    }

    #[test]
    fn occupied_rooms_survive_the_sweep() {
        let registry = registry();
        let (_, _) = registry.create_room(
            "alpha".to_string(),
            "alice".to_string(),
            "s1".to_string(),
            None,
            TimerMode::Unlimited,
            GameMode::Normal,
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.sweep_empty(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sweep_tears_down_deserted_rooms() {
        let registry = registry();
        let (handle, _) = registry.create_room(
            "beta".to_string(),
            "alice".to_string(),
            "s1".to_string(),
            None,
            TimerMode::Unlimited,
            GameMode::Normal,
        );
        handle.lock().unwrap().leave_by_session("s1").unwrap();
        assert_eq!(registry.sweep_empty(), 1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn a_torn_down_room_is_closed_for_late_joiners() {
        let registry = registry();
        let (handle, _) = registry.create_room(
            "gamma".to_string(),
            "alice".to_string(),
            "s1".to_string(),
            None,
            TimerMode::Unlimited,
            GameMode::Normal,
        );
        let room_id = handle.lock().unwrap().id.clone();
        handle.lock().unwrap().leave_by_session("s1").unwrap();
        assert!(registry.remove_if_empty(&room_id));

        // a joiner still holding the stale handle is turned away
        let err = handle
            .lock()
            .unwrap()
            .join("bob".to_string(), "s2".to_string(), None)
            .unwrap_err();
        assert_eq!(err, crate::game::GameError::RoomNotFound);
        assert!(registry.get(&room_id).is_none());
    }
}
