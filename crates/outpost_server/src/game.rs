use std::sync::Arc;
use std::time::Instant;

use anyhow::bail;
use async_trait::async_trait;
use glam::Vec3;
use outpost_network::{
    ConnectionRegistry, PacketContext, PacketHandler, Session, SessionEvent, SessionId,
};
use outpost_protocol::packets::{
    LoginRequestC2s, LoginResponseS2c, MoveRequestC2s, ObjectDespawnS2c, ObjectSnapshotS2c,
    ObjectSpawnS2c, ObjectUpdateS2c, ReconnectRequestC2s, ReconnectResponseS2c,
};
use outpost_protocol::{Decode, Packet, PacketFrame};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::character::Character;
use crate::config::GameSettings;
use crate::entity::Entity;
use crate::map::{Map, TickObserver};

/// A character held for its disconnected session, pending reconnection.
struct ParkedCharacter {
    character: Character,
    since: Instant,
}

/// What the service remembers about a session that started a game.
struct SessionMeta {
    username: String,
    token: Option<String>,
}

#[derive(Default)]
struct ServiceState {
    /// session id -> character id, for sessions with a live character.
    characters: FxHashMap<SessionId, u32>,
    /// auth token -> session id.
    tokens: FxHashMap<String, SessionId>,
    /// username -> session id of the last session that played it.
    usernames: FxHashMap<String, SessionId>,
    meta: FxHashMap<SessionId, SessionMeta>,
    parked: FxHashMap<SessionId, ParkedCharacter>,
}

/// The game behind the dispatcher: login, reconnection, movement intent, and
/// the per-tick delta broadcast.
pub struct GameService {
    authenticator: Arc<dyn Authenticator>,
    map: Arc<Map>,
    registry: Arc<ConnectionRegistry>,
    settings: GameSettings,
    state: Mutex<ServiceState>,
}

impl GameService {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        map: Arc<Map>,
        registry: Arc<ConnectionRegistry>,
        settings: GameSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            authenticator,
            map,
            registry,
            settings,
            state: Mutex::new(ServiceState::default()),
        })
    }

    /// The character id owned by a session, if it has started a game.
    pub fn character_of(&self, sid: SessionId) -> Option<u32> {
        self.state.lock().characters.get(&sid).copied()
    }

    pub fn parked_count(&self) -> usize {
        self.state.lock().parked.len()
    }

    /// Spawns the task that reacts to registry connect/disconnect events.
    pub fn spawn_event_pump(
        self: &Arc<Self>,
        events: flume::Receiver<SessionEvent>,
    ) -> JoinHandle<()> {
        let service = self.clone();

        tokio::spawn(async move {
            while let Ok(event) = events.recv_async().await {
                match event {
                    SessionEvent::Connected(session) => {
                        debug!(session = %session.id(), addr = %session.remote_addr(), "session connected");
                    }
                    SessionEvent::Disconnected(sid) => service.handle_disconnect(sid).await,
                }
            }
        })
    }

    /// Spawns the task that evicts parked characters past the grace window.
    pub fn spawn_parking_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let service = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.settings.park_sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                service.evict_expired_parks();
            }
        })
    }

    fn evict_expired_parks(&self) {
        let grace = self.settings.grace_period;
        let mut state = self.state.lock();

        let expired: Vec<SessionId> = state
            .parked
            .iter()
            .filter(|(_, p)| p.since.elapsed() > grace)
            .map(|(&sid, _)| sid)
            .collect();

        for sid in expired {
            let Some(parked) = state.parked.remove(&sid) else {
                continue;
            };

            if let Some(meta) = state.meta.remove(&sid) {
                if state.usernames.get(&meta.username) == Some(&sid) {
                    state.usernames.remove(&meta.username);
                }
                if let Some(token) = meta.token {
                    if state.tokens.get(&token) == Some(&sid) {
                        state.tokens.remove(&token);
                    }
                }
            }

            info!(
                session = %sid,
                character = parked.character.id(),
                "reconnect grace expired, destroying character"
            );
            self.map.return_character(parked.character);
        }
    }

    /// Parks the character of a dropped session and tells its neighbors.
    async fn handle_disconnect(&self, sid: SessionId) {
        // The area goes regardless; a reconnect may already have stolen the
        // character from this session.
        self.map.interest().remove_area(sid);

        let Some(cid) = self.state.lock().characters.remove(&sid) else {
            return;
        };

        let watchers = self.map.interest().resolve_on_despawn(cid);
        self.map.tracker().remove(cid);

        let Some(Entity::Character(mut character)) = self.map.take(cid) else {
            return;
        };
        character.session = None;
        character.move_target = None;

        info!(session = %sid, character = cid, "session dropped, parking character");

        self.state.lock().parked.insert(
            sid,
            ParkedCharacter {
                character,
                since: Instant::now(),
            },
        );

        self.broadcast_despawn(cid, watchers, Some(sid)).await;
    }

    async fn handle_login(&self, session: &Session, req: LoginRequestC2s) -> anyhow::Result<()> {
        if self.character_of(session.id()).is_some() {
            return self
                .reject_login(session, anyhow::anyhow!("session already in game"))
                .await;
        }

        let token = match self
            .authenticator
            .authenticate(&req.username, &req.password)
            .await
        {
            Ok(token) => token,
            Err(err) if self.settings.allow_auto_register => {
                debug!(username = %req.username, "login failed ({err:#}), auto-registering");

                match self.authenticator.register(&req.username, &req.password).await {
                    Ok(()) => {
                        match self
                            .authenticator
                            .authenticate(&req.username, &req.password)
                            .await
                        {
                            Ok(token) => token,
                            Err(err) => return self.reject_login(session, err).await,
                        }
                    }
                    Err(_) => return self.reject_login(session, err).await,
                }
            }
            Err(err) => return self.reject_login(session, err).await,
        };

        self.start_game(session, req.username, Some(token.clone()))
            .await?;

        session
            .send_packet(&LoginResponseS2c {
                success: true,
                message: "welcome".into(),
                token,
            })
            .await
    }

    async fn reject_login(&self, session: &Session, err: anyhow::Error) -> anyhow::Result<()> {
        debug!(session = %session.id(), "login rejected: {err:#}");

        session
            .send_packet(&LoginResponseS2c {
                success: false,
                message: err.to_string(),
                token: String::new(),
            })
            .await
    }

    /// Creates a character at the origin and brings the session into the
    /// world.
    async fn start_game(
        &self,
        session: &Session,
        username: String,
        token: Option<String>,
    ) -> anyhow::Result<u32> {
        let sid = session.id();
        let origin = Vec3::ZERO;

        let mut character = self.map.rent_character(origin);
        character.session = Some(sid);
        let cid = character.id();

        self.map.insert(Entity::Character(character));

        {
            let mut state = self.state.lock();
            state.characters.insert(sid, cid);
            state.usernames.insert(username.clone(), sid);
            if let Some(token) = &token {
                state.tokens.insert(token.clone(), sid);
            }
            state.meta.insert(sid, SessionMeta { username, token });
        }

        info!(session = %sid, character = cid, "character entered the world");

        self.enter_world(session, cid, origin, true).await?;

        Ok(cid)
    }

    /// Installs the session's interest area at `pos`, seeds its watch set,
    /// optionally sends the initial snapshot, and announces the character to
    /// every session already watching that spot.
    async fn enter_world(
        &self,
        session: &Session,
        cid: u32,
        pos: Vec3,
        send_snapshot: bool,
    ) -> anyhow::Result<()> {
        let sid = session.id();
        let radius = self.settings.interest_radius;

        self.map.interest().set_area(sid, pos, radius);

        let objects = self.map.states_in_range(pos, radius, Some(cid));
        for object in &objects {
            self.map.interest().watch(sid, object.id);
        }

        if send_snapshot {
            session.send_packet(&ObjectSnapshotS2c { objects }).await?;
        }

        let Some(object) = self.map.entity_state(cid) else {
            bail!("character {cid} vanished while entering the world");
        };

        // Announce through the watch set rather than a bulk resolution: the
        // tick loop may have beaten us to some sessions, and each of them
        // must hear the spawn exactly once.
        for watcher in self.map.interest().sessions_containing(pos) {
            if !self.map.interest().watch(watcher, cid) || watcher == sid {
                continue;
            }
            if let Some(neighbor) = self.registry.get(watcher) {
                let _ = neighbor.send_packet(&ObjectSpawnS2c { object }).await;
            }
        }

        Ok(())
    }

    async fn handle_reconnect(
        &self,
        session: &Session,
        req: ReconnectRequestC2s,
    ) -> anyhow::Result<()> {
        let sid = session.id();

        // Token validation happens before the state lock; the token path only
        // counts when the authenticator still recognizes the token.
        let token_valid = !req.token.is_empty()
            && self.authenticator.validate_token(&req.token).await.is_some();

        let adopted = self.adopt_character(sid, &req, token_valid);

        match adopted {
            Some(Adopted { cid, old_sid, stale_session }) => {
                // A zombie connection may still own the character's old
                // session; it loses it now.
                if let Some(stale) = stale_session {
                    stale.disconnect();
                }

                self.map.set_character_session(cid, Some(sid));

                let Some(pos) = self.map.position_of(cid) else {
                    bail!("adopted character {cid} has no position");
                };

                info!(session = %sid, character = cid, "session reconnected");

                self.enter_world(session, cid, pos, false).await?;

                session
                    .send_packet(&ReconnectResponseS2c {
                        success: true,
                        message: "session restored".into(),
                        session_id: old_sid.to_string(),
                    })
                    .await
            }
            None => {
                // Reconnection miss: treat it as a fresh login on the same
                // connection.
                debug!(session = %sid, username = %req.username, "no session to restore, starting fresh");

                self.start_game(session, req.username, None).await?;

                session
                    .send_packet(&ReconnectResponseS2c {
                        success: true,
                        message: "no session found, started a new game".into(),
                        session_id: String::new(),
                    })
                    .await
            }
        }
    }

    /// Finds the character the request refers to, rebinding every mapping to
    /// the new session. Parked characters are re-inserted into the map at
    /// their parked position.
    fn adopt_character(
        &self,
        sid: SessionId,
        req: &ReconnectRequestC2s,
        token_valid: bool,
    ) -> Option<Adopted> {
        let mut state = self.state.lock();

        let old_sid = token_valid
            .then(|| state.tokens.get(&req.token).copied())
            .flatten()
            .or_else(|| state.usernames.get(&req.username).copied())?;

        let (cid, stale_session) = if let Some(cid) = state.characters.remove(&old_sid) {
            // The old session is still live; steal its character.
            (cid, self.registry.get(old_sid))
        } else if let Some(parked) = state.parked.remove(&old_sid) {
            let mut character = parked.character;
            character.session = Some(sid);
            let cid = character.id();
            self.map.insert(Entity::Character(character));
            (cid, None)
        } else {
            return None;
        };

        let meta = state.meta.remove(&old_sid);
        let (username, token) = match meta {
            Some(meta) => (meta.username, meta.token),
            None => (req.username.clone(), None),
        };

        state.characters.insert(sid, cid);
        state.usernames.insert(username.clone(), sid);
        if let Some(token) = &token {
            state.tokens.insert(token.clone(), sid);
        }
        state.meta.insert(sid, SessionMeta { username, token });

        Some(Adopted {
            cid,
            old_sid,
            stale_session,
        })
    }

    async fn handle_move(&self, session: &Session, req: MoveRequestC2s) -> anyhow::Result<()> {
        let Some(cid) = self.map.character_of_session(session.id()) else {
            debug!(session = %session.id(), "move request before login, ignoring");
            return Ok(());
        };

        self.map.set_move_target(cid, req.target);
        Ok(())
    }

    async fn broadcast_despawn(
        &self,
        id: u32,
        watchers: FxHashSet<SessionId>,
        skip: Option<SessionId>,
    ) {
        for watcher in watchers {
            if Some(watcher) == skip {
                continue;
            }
            if let Some(session) = self.registry.get(watcher) {
                let _ = session.send_packet(&ObjectDespawnS2c { id }).await;
            }
        }
    }

    /// Moves a session's view circle along with its character, spawning and
    /// despawning objects that enter or leave sight. The watch set arbitrates
    /// with the movers' own resolutions so each transition is announced once.
    async fn move_view(&self, sid: SessionId, cid: u32, old_center: Vec3, new_center: Vec3) {
        let radius = self.settings.interest_radius;
        self.map.interest().set_area(sid, new_center, radius);

        let Some(session) = self.registry.get(sid) else {
            return;
        };

        let old_ids: FxHashSet<u32> = self.map.ids_in_range(old_center, radius).into_iter().collect();
        let new_ids: FxHashSet<u32> = self.map.ids_in_range(new_center, radius).into_iter().collect();

        for &id in new_ids.difference(&old_ids) {
            if id == cid {
                continue;
            }
            if self.map.interest().watch(sid, id) {
                if let Some(object) = self.map.entity_state(id) {
                    let _ = session.send_packet(&ObjectSpawnS2c { object }).await;
                }
            }
        }

        for &id in old_ids.difference(&new_ids) {
            if id == cid {
                continue;
            }
            if self.map.interest().unwatch(sid, id) {
                let _ = session.send_packet(&ObjectDespawnS2c { id }).await;
            }
        }
    }
}

/// Who currently owns which character, inverted for the broadcast pass.
fn owners_by_character(state: &ServiceState) -> FxHashMap<u32, SessionId> {
    state
        .characters
        .iter()
        .map(|(&sid, &cid)| (cid, sid))
        .collect()
}

struct Adopted {
    cid: u32,
    old_sid: SessionId,
    stale_session: Option<Session>,
}

#[async_trait]
impl PacketHandler for GameService {
    async fn handle_packet(&self, ctx: PacketContext) -> anyhow::Result<()> {
        match ctx.frame.id {
            LoginRequestC2s::ID => {
                let req = decode_or_disconnect(&ctx.session, &ctx.frame)?;
                self.handle_login(&ctx.session, req).await
            }
            ReconnectRequestC2s::ID => {
                let req = decode_or_disconnect(&ctx.session, &ctx.frame)?;
                self.handle_reconnect(&ctx.session, req).await
            }
            MoveRequestC2s::ID => {
                let req = decode_or_disconnect(&ctx.session, &ctx.frame)?;
                self.handle_move(&ctx.session, req).await
            }
            id => {
                // Unknown ids are protocol errors, not handler errors.
                warn!(session = %ctx.session.id(), id, "unknown packet id");
                ctx.session.disconnect();
                bail!("unknown packet id {id}");
            }
        }
    }
}

/// A malformed body is a protocol error: the session is disconnected and the
/// error propagates into the worker's log.
fn decode_or_disconnect<'a, P>(session: &Session, frame: &'a PacketFrame) -> anyhow::Result<P>
where
    P: Packet + Decode<'a>,
{
    match frame.decode() {
        Ok(pkt) => Ok(pkt),
        Err(err) => {
            session.disconnect();
            Err(err)
        }
    }
}

#[async_trait]
impl TickObserver for GameService {
    async fn after_tick(&self, map: &Arc<Map>, removed: Vec<u32>) {
        for id in removed {
            map.tracker().remove(id);
            let watchers = map.interest().resolve_on_despawn(id);
            self.broadcast_despawn(id, watchers, None).await;
        }

        let owners = owners_by_character(&self.state.lock());

        for object in map.all_states() {
            let delta = map
                .tracker()
                .delta(object.id, object.position, object.hp, object.level);

            if delta.flags.is_empty() {
                continue;
            }

            let update = ObjectUpdateS2c {
                id: object.id,
                position: delta.flags.position().then_some(object.position),
                hp: delta.flags.hp().then_some(object.hp),
                level: delta.flags.level().then_some(object.level),
            };

            let owner = owners.get(&object.id).copied();

            if delta.flags.position() {
                if let Some(sid) = owner {
                    self.move_view(sid, object.id, delta.prev_position, object.position)
                        .await;
                }

                let res = map
                    .interest()
                    .resolve_on_move(object.id, delta.prev_position, object.position);

                let entered: FxHashSet<SessionId> = res.entered.iter().copied().collect();
                let exited: FxHashSet<SessionId> = res.exited.iter().copied().collect();

                // The owner is a recipient like any other: its area contains
                // its own character, so it hears its own deltas (never a
                // spawn; it has watched itself since entering the world).
                for sid in res.union {
                    let Some(session) = self.registry.get(sid) else {
                        continue;
                    };

                    if entered.contains(&sid) {
                        // First sight of the object: a spawn, not a delta.
                        let _ = session.send_packet(&ObjectSpawnS2c { object }).await;
                    } else if exited.contains(&sid) {
                        // One final frame, then out of sight.
                        let _ = session.send_packet(&update).await;
                        let _ = session
                            .send_packet(&ObjectDespawnS2c { id: object.id })
                            .await;
                    } else {
                        let _ = session.send_packet(&update).await;
                    }
                }
            } else {
                for sid in map.interest().watchers_of(object.id) {
                    if let Some(session) = self.registry.get(sid) {
                        let _ = session.send_packet(&update).await;
                    }
                }
            }
        }
    }
}
