use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::events::CoreEvent;
use songbird::input::{Input, RawAdapter};
use songbird::tracks::TrackHandle;
use songbird::{Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent};
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use symphonia::core::io::MediaSource;
use tracing::{debug, info, warn};

use super::transcoder::{PcmStream, CHANNELS, SAMPLE_RATE};
use super::transport::{AudioSink, SessionEvent, VoiceTransport};

/// Voice transport backed by songbird's gateway integration.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: flume::Sender<SessionEvent>,
    ) -> Result<Arc<dyn AudioSink>> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .context("Error al conectar al canal de voz")?;

        {
            let mut handler = call.lock().await;
            handler.remove_all_global_events();
            register_connection_events(&mut handler, &events);
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        Ok(Arc::new(SongbirdSink {
            call,
            track: Mutex::new(None),
            events,
        }))
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<()> {
        if self.manager.get(guild_id).is_none() {
            return Ok(());
        }

        self.manager
            .remove(guild_id)
            .await
            .context("Error al desconectar del canal de voz")?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }
}

fn register_connection_events(handler: &mut Call, events: &flume::Sender<SessionEvent>) {
    handler.add_global_event(
        Event::Core(CoreEvent::DriverDisconnect),
        ConnectionForwarder {
            events: events.clone(),
            event: SessionEvent::Disconnected,
        },
    );

    for reconnected in [CoreEvent::DriverConnect, CoreEvent::DriverReconnect] {
        handler.add_global_event(
            Event::Core(reconnected),
            ConnectionForwarder {
                events: events.clone(),
                event: SessionEvent::Recovered,
            },
        );
    }
}

/// One songbird call with at most one live track.
pub struct SongbirdSink {
    call: Arc<tokio::sync::Mutex<Call>>,
    track: Mutex<Option<TrackHandle>>,
    events: flume::Sender<SessionEvent>,
}

impl SongbirdSink {
    fn current(&self) -> Option<TrackHandle> {
        self.track.lock().clone()
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn play(&self, stream: PcmStream, play_id: u64, volume: f32) -> Result<()> {
        let input: Input = RawAdapter::new(S16ToF32::new(stream), SAMPLE_RATE, CHANNELS).into();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };

        handle.set_volume(volume)?;
        handle.add_event(
            Event::Track(TrackEvent::End),
            TrackForwarder {
                events: self.events.clone(),
                play_id,
                errored: false,
            },
        )?;
        handle.add_event(
            Event::Track(TrackEvent::Error),
            TrackForwarder {
                events: self.events.clone(),
                play_id,
                errored: true,
            },
        )?;

        *self.track.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        if let Some(track) = self.current() {
            track.pause()?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if let Some(track) = self.current() {
            track.play()?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.track.lock().take();
        self.call.lock().await.stop();
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        if let Some(track) = self.current() {
            track.set_volume(volume)?;
        }
        Ok(())
    }
}

/// Reenvía fin/error de una pista al loop de la sesión
struct TrackForwarder {
    events: flume::Sender<SessionEvent>,
    play_id: u64,
    errored: bool,
}

#[async_trait]
impl VoiceEventHandler for TrackForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let event = if self.errored {
            let reason = match ctx {
                EventContext::Track(tracks) => tracks
                    .first()
                    .map(|(state, _)| format!("{:?}", state.playing))
                    .unwrap_or_else(|| "desconocido".to_string()),
                _ => "desconocido".to_string(),
            };
            SessionEvent::TrackErrored {
                play_id: self.play_id,
                reason,
            }
        } else {
            SessionEvent::TrackEnded { play_id: self.play_id }
        };

        if self.events.send(event).is_err() {
            debug!("Sesión cerrada, evento de pista descartado");
        }

        Some(Event::Cancel)
    }
}

struct ConnectionForwarder {
    events: flume::Sender<SessionEvent>,
    event: SessionEvent,
}

#[async_trait]
impl VoiceEventHandler for ConnectionForwarder {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if self.event == SessionEvent::Disconnected {
            warn!("🔌 Conexión de voz perdida");
        }
        let _ = self.events.send(self.event.clone());
        None
    }
}

/// Converts ffmpeg's s16le output into the f32 PCM songbird's
/// [`RawAdapter`] expects. Forward-only.
pub struct S16ToF32 {
    inner: PcmStream,
    converted: Vec<u8>,
    offset: usize,
    carry: Option<u8>,
}

impl S16ToF32 {
    pub fn new(inner: PcmStream) -> Self {
        Self {
            inner,
            converted: Vec::new(),
            offset: 0,
            carry: None,
        }
    }

    /// Refills `converted`. Returns false at end of stream.
    fn refill(&mut self) -> std::io::Result<bool> {
        let mut raw = [0u8; 4096];

        loop {
            let read = self.inner.read(&mut raw)?;
            if read == 0 {
                return Ok(false);
            }

            self.converted.clear();
            self.offset = 0;

            let mut bytes = raw[..read].iter().copied();
            if let Some(low) = self.carry.take() {
                if let Some(high) = bytes.next() {
                    self.push_sample(low, high);
                }
            }

            let rest: Vec<u8> = bytes.collect();
            let mut pairs = rest.chunks_exact(2);
            for pair in &mut pairs {
                self.push_sample(pair[0], pair[1]);
            }
            self.carry = pairs.remainder().first().copied();

            if !self.converted.is_empty() {
                return Ok(true);
            }
        }
    }

    fn push_sample(&mut self, low: u8, high: u8) {
        let sample = i16::from_le_bytes([low, high]) as f32 / 32768.0;
        self.converted.extend_from_slice(&sample.to_le_bytes());
    }
}

impl Read for S16ToF32 {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.offset >= self.converted.len() && !self.refill()? {
            return Ok(0);
        }

        let available = &self.converted[self.offset..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.offset += count;
        Ok(count)
    }
}

impl Seek for S16ToF32 {
    fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "el stream de ffmpeg no admite seek",
        ))
    }
}

impl MediaSource for S16ToF32 {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    /// Entrega un byte por lectura para forzar muestras partidas
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let limit = buf.len().min(1);
            self.0.read(&mut buf[..limit])
        }
    }

    fn samples(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    const INPUT: [u8; 6] = [0x00, 0x80, 0x00, 0x40, 0x00, 0x00];

    #[test]
    fn converts_s16le_to_f32le() {
        let mut reader = S16ToF32::new(Box::new(Cursor::new(INPUT.to_vec())));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(samples(&out), vec![-1.0, 0.5, 0.0]);
    }

    #[test]
    fn samples_split_across_reads_are_joined() {
        let mut reader = S16ToF32::new(Box::new(Trickle(Cursor::new(INPUT.to_vec()))));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(samples(&out), vec![-1.0, 0.5, 0.0]);
    }

    #[test]
    fn small_output_buffers_are_served_in_pieces() {
        let mut reader = S16ToF32::new(Box::new(Cursor::new(INPUT.to_vec())));
        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }

        assert_eq!(out.len(), 12);
        assert!(!reader.is_seekable());
        assert!(reader.seek(SeekFrom::Start(0)).is_err());
    }
}
