//! Playback controller.
//!
//! Each guild gets one [`Session`]: its queue, an optional voice link and
//! the cleanup handle of whatever is playing. Once connected, a session runs
//! a single event loop task; every track transition (advance, retry,
//! autoplay, teardown) happens on that task, so transitions for one guild
//! never interleave. Commands only touch the queue under its lock and hand
//! the rest to the loop, either by stopping the sink (which comes back as a
//! track-end event) or by sending [`SessionEvent::Kick`].

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use rand::Rng;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::notice::{Notice, Notifier};
use super::queue::{MusicQueue, PlaybackState, QueueInfo};
use super::transcoder::{AudioHandle, CleanupHandle, Transcoder};
use super::transport::{AudioSink, SessionEvent, VoiceTransport};
use crate::config::Config;
use crate::error::PlaybackError;
use crate::sources::{AudioUrlResolver, SourceType, Track, VideoInfo, VideoSearch};

const AUTOPLAY_REQUESTER: &str = "Autoplay";
const AUTOPLAY_SEARCH_SIZE: usize = 5;

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub default_volume: u8,
    pub history_size: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub reconnect_window: Duration,
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_volume: config.default_volume,
            history_size: config.history_size,
            max_retries: config.max_play_retries,
            retry_backoff: Duration::from_secs(1),
            reconnect_window: config.reconnect_window,
        }
    }
}

/// Turns a queued track into a live PCM stream.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn open(&self, track: &Track) -> Result<AudioHandle, PlaybackError>;
}

/// Proxy resolution followed by ffmpeg.
pub struct StreamOpener {
    resolver: AudioUrlResolver,
    transcoder: Transcoder,
}

impl StreamOpener {
    pub fn new(resolver: AudioUrlResolver, transcoder: Transcoder) -> Self {
        Self { resolver, transcoder }
    }
}

#[async_trait]
impl AudioSource for StreamOpener {
    async fn open(&self, track: &Track) -> Result<AudioHandle, PlaybackError> {
        let resolved = self.resolver.resolve(&track.url).await?;
        self.transcoder.spawn(&resolved.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    NothingPlaying,
    Recorded { votes: usize, needed: usize },
    AlreadyVoted { votes: usize, needed: usize },
    Skipped { title: String },
}

struct VoiceLink {
    sink: Arc<dyn AudioSink>,
    events: flume::Sender<SessionEvent>,
    shutdown: CancellationToken,
}

/// One guild's playback state.
pub struct Session {
    guild_id: GuildId,
    text_channel: RwLock<Option<ChannelId>>,
    queue: RwLock<MusicQueue>,
    link: RwLock<Option<Arc<VoiceLink>>>,
    cleanup: Mutex<Option<CleanupHandle>>,
    votes: Mutex<HashSet<UserId>>,
    connecting: tokio::sync::Mutex<()>,
    // Se incrementa con cada skip durante la resolución
    generation: AtomicU64,
    play_ids: AtomicU64,
    current_play: AtomicU64,
}

impl Session {
    fn new(guild_id: GuildId, settings: &PlayerSettings) -> Self {
        Self {
            guild_id,
            text_channel: RwLock::new(None),
            queue: RwLock::new(MusicQueue::new(settings.default_volume, settings.history_size)),
            link: RwLock::new(None),
            cleanup: Mutex::new(None),
            votes: Mutex::new(HashSet::new()),
            connecting: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            play_ids: AtomicU64::new(0),
            current_play: AtomicU64::new(0),
        }
    }

    fn link(&self) -> Option<Arc<VoiceLink>> {
        self.link.read().clone()
    }

    fn release_cleanup(&self) {
        let handle = self.cleanup.lock().take();
        if let Some(handle) = handle {
            handle.release();
        }
    }

    /// True once per play: the first end/error event for `play_id` wins.
    fn consume_play(&self, play_id: u64) -> bool {
        play_id != 0
            && self
                .current_play
                .compare_exchange(play_id, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    fn supersede(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

enum Flow {
    Continue,
    Teardown,
}

enum Started {
    Playing,
    Drained,
    Superseded,
}

pub struct PlaybackController {
    sessions: DashMap<GuildId, Arc<Session>>,
    transport: Arc<dyn VoiceTransport>,
    audio: Arc<dyn AudioSource>,
    search: Arc<dyn VideoSearch>,
    notifier: Arc<dyn Notifier>,
    settings: PlayerSettings,
}

impl PlaybackController {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        audio: Arc<dyn AudioSource>,
        search: Arc<dyn VideoSearch>,
        notifier: Arc<dyn Notifier>,
        settings: PlayerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            transport,
            audio,
            search,
            notifier,
            settings,
        })
    }

    fn session(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    fn session_or_create(&self, guild_id: GuildId) -> Arc<Session> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Session::new(guild_id, &self.settings)))
            .clone()
    }

    fn connected(&self, guild_id: GuildId) -> Result<(Arc<Session>, Arc<VoiceLink>), PlaybackError> {
        let session = self.session(guild_id).ok_or(PlaybackError::NotConnected)?;
        let link = session.link().ok_or(PlaybackError::NotConnected)?;
        Ok((session, link))
    }

    /// Joins the voice channel unless the guild already has a connection.
    /// Notices go to `text_channel` from now on.
    pub async fn connect(
        self: &Arc<Self>,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<()> {
        let session = self.session_or_create(guild_id);
        let _connecting = session.connecting.lock().await;

        *session.text_channel.write() = Some(text_channel);
        if session.link().is_some() {
            return Ok(());
        }

        let (events_tx, events_rx) = flume::unbounded();
        let sink = self
            .transport
            .connect(guild_id, voice_channel, events_tx.clone())
            .await?;

        let link = Arc::new(VoiceLink {
            sink,
            events: events_tx,
            shutdown: CancellationToken::new(),
        });
        *session.link.write() = Some(link.clone());

        {
            let mut queue = session.queue.write();
            if queue.state() == PlaybackState::Idle {
                queue.set_state(PlaybackState::ConnectedIdle);
            }
        }

        // Si la sesión fue destruida mientras conectábamos, no arrancar el loop
        let still_current = self
            .session(guild_id)
            .is_some_and(|current| Arc::ptr_eq(&current, &session));
        if !still_current {
            self.teardown(&session).await;
            anyhow::bail!("La sesión se cerró durante la conexión");
        }

        tokio::spawn(self.clone().run_session(session.clone(), link, events_rx));
        Ok(())
    }

    /// Appends a track. Returns its 1-based position in the pending queue.
    pub fn enqueue(&self, guild_id: GuildId, track: Track) -> Result<usize, PlaybackError> {
        let (session, link) = self.connected(guild_id)?;

        let (position, idle) = {
            let mut queue = session.queue.write();
            queue.push(track);
            (queue.len(), queue.state() == PlaybackState::ConnectedIdle)
        };

        if idle {
            let _ = link.events.send(SessionEvent::Kick);
        }
        Ok(position)
    }

    pub fn enqueue_many(&self, guild_id: GuildId, tracks: Vec<Track>) -> Result<usize, PlaybackError> {
        let (session, link) = self.connected(guild_id)?;

        let (added, idle) = {
            let mut queue = session.queue.write();
            let added = queue.extend(tracks);
            (added, queue.state() == PlaybackState::ConnectedIdle)
        };

        if idle && added > 0 {
            let _ = link.events.send(SessionEvent::Kick);
        }
        Ok(added)
    }

    /// Skips the current track. Returns it, or `None` if nothing was playing.
    pub async fn skip(&self, guild_id: GuildId) -> Result<Option<Track>, PlaybackError> {
        let (session, link) = self.connected(guild_id)?;

        // Bajo el lock de la cola para no cruzarse con start_track
        let (state, current) = {
            let queue = session.queue.read();
            let state = queue.state();
            if state == PlaybackState::Resolving {
                session.supersede();
            }
            (state, queue.current().cloned())
        };

        match state {
            PlaybackState::Playing | PlaybackState::Paused => {
                link.sink.stop().await.map_err(sink_error)?;
                Ok(current)
            }
            PlaybackState::Resolving => Ok(current),
            PlaybackState::Idle | PlaybackState::ConnectedIdle => Ok(None),
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<bool, PlaybackError> {
        self.switch_state(guild_id, PlaybackState::Playing, PlaybackState::Paused)
            .await
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<bool, PlaybackError> {
        self.switch_state(guild_id, PlaybackState::Paused, PlaybackState::Playing)
            .await
    }

    async fn switch_state(
        &self,
        guild_id: GuildId,
        from: PlaybackState,
        to: PlaybackState,
    ) -> Result<bool, PlaybackError> {
        let (session, link) = self.connected(guild_id)?;

        {
            let mut queue = session.queue.write();
            if queue.state() != from {
                return Ok(false);
            }
            queue.set_state(to);
        }

        let result = match to {
            PlaybackState::Paused => link.sink.pause().await,
            _ => link.sink.resume().await,
        };

        if let Err(e) = result {
            let mut queue = session.queue.write();
            if queue.state() == to {
                queue.set_state(from);
            }
            return Err(sink_error(e));
        }
        Ok(true)
    }

    /// Full teardown. Returns false when the guild had no session.
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        self.destroy(guild_id).await
    }

    /// Shuffles pending tracks and flips the shuffle flag.
    pub fn shuffle(&self, guild_id: GuildId) -> bool {
        let session = self.session_or_create(guild_id);
        let mut queue = session.queue.write();
        queue.shuffle_with(&mut rand::thread_rng())
    }

    pub fn clear(&self, guild_id: GuildId) -> usize {
        self.session(guild_id)
            .map(|session| session.queue.write().clear())
            .unwrap_or(0)
    }

    /// Moves a random pending track to the front and plays it now.
    pub async fn play_random(&self, guild_id: GuildId) -> Result<Option<Track>, PlaybackError> {
        let (session, _) = self.connected(guild_id)?;
        let index = session.queue.read().random_index(&mut rand::thread_rng());

        match index {
            Some(index) => self.play_random_at(guild_id, index).await,
            None => Ok(None),
        }
    }

    pub async fn play_random_at(&self, guild_id: GuildId, index: usize) -> Result<Option<Track>, PlaybackError> {
        let (session, link) = self.connected(guild_id)?;

        let (picked, state) = {
            let mut queue = session.queue.write();
            let picked = queue.move_to_front(index).cloned();
            if picked.is_some() && queue.state() == PlaybackState::Resolving {
                session.supersede();
            }
            (picked, queue.state())
        };
        let Some(picked) = picked else {
            return Ok(None);
        };

        match state {
            PlaybackState::Playing | PlaybackState::Paused => {
                link.sink.stop().await.map_err(sink_error)?;
            }
            PlaybackState::Resolving => {}
            PlaybackState::Idle | PlaybackState::ConnectedIdle => {
                let _ = link.events.send(SessionEvent::Kick);
            }
        }

        info!("🎲 Reproduciendo al azar: {}", picked.title);
        Ok(Some(picked))
    }

    pub fn set_loop(&self, guild_id: GuildId, enabled: bool) {
        self.session_or_create(guild_id).queue.write().set_loop(enabled);
    }

    pub fn set_autoplay(&self, guild_id: GuildId, enabled: bool) {
        self.session_or_create(guild_id).queue.write().set_autoplay(enabled);
    }

    pub fn toggle_autoplay(&self, guild_id: GuildId) -> bool {
        let session = self.session_or_create(guild_id);
        let mut queue = session.queue.write();
        let enabled = !queue.is_autoplay();
        queue.set_autoplay(enabled);
        enabled
    }

    /// Stores the volume (0-100) and applies it to the live track.
    pub async fn set_volume(&self, guild_id: GuildId, volume: u8) -> u8 {
        let session = self.session_or_create(guild_id);

        let (volume, active) = {
            let mut queue = session.queue.write();
            queue.set_volume(volume);
            (queue.volume(), queue.is_playing())
        };

        if let (true, Some(link)) = (active, session.link()) {
            if let Err(e) = link.sink.set_volume(f32::from(volume) / 100.0).await {
                warn!("⚠️ No se pudo aplicar el volumen: {:?}", e);
            }
        }

        info!("🔊 Volumen ajustado a {}%", volume);
        volume
    }

    pub fn snapshot(&self, guild_id: GuildId) -> Option<QueueInfo> {
        self.session(guild_id).map(|session| session.queue.read().info())
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        self.session(guild_id)
            .and_then(|session| session.queue.read().current().cloned())
    }

    /// Channel owners skip directly; everyone else needs half of the
    /// `listeners`, rounded up.
    pub async fn vote_skip(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        is_owner: bool,
        listeners: usize,
    ) -> Result<VoteOutcome, PlaybackError> {
        let (session, _) = self.connected(guild_id)?;

        let current = session.queue.read().current().cloned();
        let Some(current) = current else {
            return Ok(VoteOutcome::NothingPlaying);
        };

        if !is_owner {
            let needed = listeners.div_ceil(2).max(1);
            let (fresh, votes) = {
                let mut tally = session.votes.lock();
                let fresh = tally.insert(user_id);
                (fresh, tally.len())
            };

            if !fresh {
                return Ok(VoteOutcome::AlreadyVoted { votes, needed });
            }
            if votes < needed {
                return Ok(VoteOutcome::Recorded { votes, needed });
            }
        }

        self.skip(guild_id).await?;
        session.votes.lock().clear();
        Ok(VoteOutcome::Skipped { title: current.title })
    }

    /// Removes the guild's session and releases everything it holds.
    pub async fn destroy(&self, guild_id: GuildId) -> bool {
        match self.sessions.remove(&guild_id) {
            Some((_, session)) => {
                self.teardown(&session).await;
                true
            }
            None => false,
        }
    }

    async fn destroy_if_current(&self, session: &Arc<Session>) {
        let removed = self
            .sessions
            .remove_if(&session.guild_id, |_, current| Arc::ptr_eq(current, session));
        if removed.is_some() {
            self.teardown(session).await;
        }
    }

    async fn teardown(&self, session: &Session) {
        let link = session.link.write().take();
        if let Some(link) = &link {
            link.shutdown.cancel();
        }

        session.release_cleanup();
        session.votes.lock().clear();
        {
            let mut queue = session.queue.write();
            queue.set_current(None);
            queue.clear();
            queue.set_state(PlaybackState::Idle);
        }

        if let Some(link) = link {
            if let Err(e) = link.sink.stop().await {
                warn!("⚠️ Error deteniendo el reproductor: {:?}", e);
            }
            if let Err(e) = self.transport.disconnect(session.guild_id).await {
                warn!("⚠️ Error desconectando de voz: {:?}", e);
            }
        }

        info!("⏹️ Sesión cerrada en guild {}", session.guild_id);
    }

    async fn run_session(
        self: Arc<Self>,
        session: Arc<Session>,
        link: Arc<VoiceLink>,
        events: flume::Receiver<SessionEvent>,
    ) {
        let mut deferred = VecDeque::new();

        loop {
            let event = match deferred.pop_front() {
                Some(event) => event,
                None => tokio::select! {
                    _ = link.shutdown.cancelled() => break,
                    event = events.recv_async() => match event {
                        Ok(event) => event,
                        Err(_) => break,
                    },
                },
            };

            let flow = tokio::select! {
                _ = link.shutdown.cancelled() => break,
                flow = self.handle_event(&session, &link, event, &events, &mut deferred) => flow,
            };

            if let Flow::Teardown = flow {
                self.destroy_if_current(&session).await;
                break;
            }
        }

        if link.shutdown.is_cancelled() {
            session.release_cleanup();
        }
        debug!("Loop de sesión terminado en guild {}", session.guild_id);
    }

    async fn handle_event(
        &self,
        session: &Session,
        link: &VoiceLink,
        event: SessionEvent,
        events: &flume::Receiver<SessionEvent>,
        deferred: &mut VecDeque<SessionEvent>,
    ) -> Flow {
        match event {
            SessionEvent::TrackEnded { play_id } => {
                if session.consume_play(play_id) {
                    self.advance(session, link).await;
                } else {
                    debug!("Fin de pista {} ignorado (ya no es la actual)", play_id);
                }
            }
            SessionEvent::TrackErrored { play_id, reason } => {
                if session.consume_play(play_id) {
                    self.on_sink_error(session, link, &reason).await;
                } else {
                    debug!("Error de pista {} ignorado (ya no es la actual)", play_id);
                }
            }
            SessionEvent::Disconnected => {
                return self.await_recovery(session, events, deferred).await;
            }
            SessionEvent::Recovered => debug!("Conexión de voz activa en guild {}", session.guild_id),
            SessionEvent::Kick => {
                let idle = session.queue.read().state() == PlaybackState::ConnectedIdle;
                if idle {
                    if let Started::Superseded = self.play_next(session, link, false).await {
                        self.advance(session, link).await;
                    }
                }
            }
        }

        Flow::Continue
    }

    /// Waits for the connection to come back. Other events are kept for later.
    async fn await_recovery(
        &self,
        session: &Session,
        events: &flume::Receiver<SessionEvent>,
        deferred: &mut VecDeque<SessionEvent>,
    ) -> Flow {
        warn!(
            "🔌 Conexión de voz perdida en guild {}, esperando {:?}",
            session.guild_id, self.settings.reconnect_window
        );

        let deadline = tokio::time::sleep(self.settings.reconnect_window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!("❌ No se recuperó la conexión en guild {}", session.guild_id);
                    return Flow::Teardown;
                }
                event = events.recv_async() => match event {
                    Ok(SessionEvent::Recovered) => {
                        info!("🔄 Conexión de voz recuperada en guild {}", session.guild_id);
                        return Flow::Continue;
                    }
                    Ok(SessionEvent::Disconnected) => continue,
                    Ok(other) => deferred.push_back(other),
                    Err(_) => return Flow::Teardown,
                },
            }
        }
    }

    /// Moves on after the current track: loop, next in queue, autoplay or idle.
    async fn advance(&self, session: &Session, link: &VoiceLink) {
        loop {
            session.release_cleanup();

            let exhausted = {
                let mut queue = session.queue.write();
                let finished = queue.take_current();
                if queue.is_loop() {
                    if let Some(track) = finished {
                        queue.push_front(track);
                    }
                }
                queue.is_empty()
            };

            if exhausted {
                if let Some(track) = self.autoplay_candidate(session).await {
                    session.queue.write().push(track);
                }
            }

            let drained = {
                let mut queue = session.queue.write();
                let drained = queue.is_empty();
                if drained {
                    queue.set_current(None);
                    queue.set_state(PlaybackState::ConnectedIdle);
                }
                drained
            };

            if drained {
                info!("📭 Cola terminada en guild {}", session.guild_id);
                self.notify(session, Notice::QueueEnded).await;
                return;
            }

            match self.play_next(session, link, false).await {
                Started::Superseded => continue,
                Started::Playing | Started::Drained => return,
            }
        }
    }

    /// Pops tracks until one starts. Failures are announced and skipped.
    async fn play_next(&self, session: &Session, link: &VoiceLink, mut retry: bool) -> Started {
        loop {
            let next = {
                let mut queue = session.queue.write();
                let next = queue.pop_next();
                if next.is_none() {
                    queue.set_current(None);
                    queue.set_state(PlaybackState::ConnectedIdle);
                }
                next
            };

            let Some(track) = next else {
                return Started::Drained;
            };

            match self.start_track(session, link, track.clone(), retry).await {
                Ok(()) => return Started::Playing,
                Err(PlaybackError::Superseded) => {
                    info!("⏭️ '{}' saltada mientras se resolvía", track.title);
                    return Started::Superseded;
                }
                Err(e) => {
                    warn!("⚠️ No se pudo reproducir '{}': {}", track.title, e);
                    self.notify(
                        session,
                        Notice::SkippingAfterError {
                            title: track.title,
                            reason: e.to_string(),
                        },
                    )
                    .await;
                }
            }

            retry = false;
        }
    }

    async fn start_track(
        &self,
        session: &Session,
        link: &VoiceLink,
        track: Track,
        retry: bool,
    ) -> Result<(), PlaybackError> {
        session.release_cleanup();

        let generation = session.generation.load(Ordering::SeqCst);
        {
            let mut queue = session.queue.write();
            queue.set_current(Some(track.clone()));
            queue.set_state(PlaybackState::Resolving);
        }

        debug!("🔎 Resolviendo audio: {}", track.title);
        let handle = self.audio.open(&track).await?;

        if session.generation.load(Ordering::SeqCst) != generation {
            handle.cleanup.release();
            return Err(PlaybackError::Superseded);
        }

        let AudioHandle { stream, cleanup } = handle;
        *session.cleanup.lock() = Some(cleanup);

        let play_id = session.play_ids.fetch_add(1, Ordering::SeqCst) + 1;
        session.current_play.store(play_id, Ordering::SeqCst);
        let volume = f32::from(session.queue.read().volume()) / 100.0;

        if let Err(e) = link.sink.play(stream, play_id, volume).await {
            session.current_play.store(0, Ordering::SeqCst);
            session.release_cleanup();
            return Err(sink_error(e));
        }

        // Un skip pudo llegar mientras el sink arrancaba
        let superseded = {
            let mut queue = session.queue.write();
            let superseded = session.generation.load(Ordering::SeqCst) != generation;
            if !superseded {
                queue.set_state(PlaybackState::Playing);
                if !retry {
                    queue.record_history(track.clone());
                    queue.reset_retry();
                }
            }
            superseded
        };

        if superseded {
            session.current_play.store(0, Ordering::SeqCst);
            if let Err(e) = link.sink.stop().await {
                warn!("⚠️ Error deteniendo pista saltada: {:?}", e);
            }
            session.release_cleanup();
            return Err(PlaybackError::Superseded);
        }
        session.votes.lock().clear();

        info!("▶️ Reproduciendo: {} en guild {}", track.title, session.guild_id);
        self.notify(session, Notice::NowPlaying(track)).await;
        Ok(())
    }

    /// Mid-playback fault: replay the same track with linear backoff, then give up.
    async fn on_sink_error(&self, session: &Session, link: &VoiceLink, reason: &str) {
        session.release_cleanup();

        let retry = {
            let mut queue = session.queue.write();
            match queue.current().cloned() {
                Some(track) if queue.retry_count() < self.settings.max_retries => {
                    let attempt = queue.bump_retry();
                    queue.set_state(PlaybackState::Resolving);
                    Some((track, attempt))
                }
                _ => None,
            }
        };

        let Some((track, attempt)) = retry else {
            let title = {
                let mut queue = session.queue.write();
                queue.reset_retry();
                queue.take_current().map(|track| track.title)
            };
            error!("❌ Error de reproducción sin más reintentos: {}", reason);
            if let Some(title) = title {
                self.notify(session, Notice::PlaybackFault { title }).await;
            }
            self.advance(session, link).await;
            return;
        };

        warn!(
            "⚠️ Error reproduciendo '{}' ({}), reintento {}/{}",
            track.title, reason, attempt, self.settings.max_retries
        );

        let generation = session.generation.load(Ordering::SeqCst);
        tokio::time::sleep(self.settings.retry_backoff * attempt).await;

        if session.generation.load(Ordering::SeqCst) != generation {
            session.queue.write().reset_retry();
            self.advance(session, link).await;
            return;
        }

        {
            let mut queue = session.queue.write();
            queue.set_current(None);
            queue.push_front(track);
        }

        if let Started::Superseded = self.play_next(session, link, true).await {
            self.advance(session, link).await;
        }
    }

    async fn autoplay_candidate(&self, session: &Session) -> Option<Track> {
        let last = {
            let queue = session.queue.read();
            if !queue.is_autoplay() {
                return None;
            }
            queue.last_played().cloned()?
        };

        let results = match self.search.search(&last.title, AUTOPLAY_SEARCH_SIZE).await {
            Ok(results) => results,
            Err(e) => {
                warn!("⚠️ Autoplay: búsqueda fallida para '{}': {:?}", last.title, e);
                return None;
            }
        };

        let video = pick_related(&results, &last, &mut rand::thread_rng())?.clone();
        info!("🔁 Autoplay: {}", video.title);
        Some(Track::from_video(&video, AUTOPLAY_REQUESTER, SourceType::YouTube))
    }

    async fn notify(&self, session: &Session, notice: Notice) {
        let channel_id = *session.text_channel.read();
        let Some(channel_id) = channel_id else {
            return;
        };

        if let Err(e) = self.notifier.notify(channel_id, notice).await {
            warn!("⚠️ No se pudo enviar aviso a {}: {:?}", channel_id, e);
        }
    }
}

/// A random related result from positions 1 to 4, never the same video.
pub fn pick_related<'a, R: Rng + ?Sized>(results: &'a [VideoInfo], last: &Track, rng: &mut R) -> Option<&'a VideoInfo> {
    let last_id = last.video_id();
    let candidates: Vec<&VideoInfo> = results
        .iter()
        .skip(1)
        .take(4)
        .filter(|video| last_id.as_deref() != Some(video.id.as_str()))
        .collect();

    candidates.choose(rng).copied()
}

fn sink_error(e: anyhow::Error) -> PlaybackError {
    PlaybackError::Sink(e.to_string())
}
