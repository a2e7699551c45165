use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;
use tracing::debug;

use crate::sources::Track;

/// Where a guild's session is in the playback lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Sin conexión de voz
    Idle,
    /// Conectado, sin reproducir
    ConnectedIdle,
    /// Buscando audio para la pista actual
    Resolving,
    Playing,
    Paused,
}

#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<Track>,
    current: Option<Track>,
    history: VecDeque<Track>,
    state: PlaybackState,
    loop_enabled: bool,
    shuffle: bool,
    autoplay: bool,
    volume: u8,
    retry_count: u32,
    max_history: usize,
}

impl MusicQueue {
    pub fn new(volume: u8, max_history: usize) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            history: VecDeque::new(),
            state: PlaybackState::Idle,
            loop_enabled: false,
            shuffle: false,
            autoplay: false,
            volume: volume.min(100),
            retry_count: 0,
            max_history: max_history.max(1),
        }
    }

    /// Agrega un track al final de la cola
    pub fn push(&mut self, track: Track) {
        debug!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(track);
    }

    /// Agrega múltiples tracks (playlist), devuelve cuántos se agregaron
    pub fn extend(&mut self, tracks: Vec<Track>) -> usize {
        let count = tracks.len();
        self.items.extend(tracks);
        count
    }

    /// Siguiente track en orden FIFO
    pub fn pop_next(&mut self) -> Option<Track> {
        self.items.pop_front()
    }

    /// Vuelve a poner un track al frente (loop y reintentos)
    pub fn push_front(&mut self, track: Track) {
        self.items.push_front(track);
    }

    pub fn set_current(&mut self, track: Option<Track>) {
        self.current = track;
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn take_current(&mut self) -> Option<Track> {
        self.current.take()
    }

    /// Adds a track to the history, evicting the oldest past the bound.
    pub fn record_history(&mut self, track: Track) {
        self.history.push_back(track);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    pub fn last_played(&self) -> Option<&Track> {
        self.history.back()
    }

    #[cfg(test)]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Limpia la cola sin tocar el track actual
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        removed
    }

    /// Fisher-Yates over the pending tracks, then flips the shuffle flag.
    /// Returns the new flag value.
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        self.items.make_contiguous().shuffle(rng);
        self.shuffle = !self.shuffle;
        self.shuffle
    }

    /// A uniformly random pending index, `None` when the queue is empty.
    pub fn random_index<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        (!self.items.is_empty()).then(|| rng.gen_range(0..self.items.len()))
    }

    /// Moves the pending track at `index` to the front.
    pub fn move_to_front(&mut self, index: usize) -> Option<&Track> {
        let track = self.items.remove(index)?;
        self.items.push_front(track);
        self.items.front()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing | PlaybackState::Paused)
    }

    pub fn is_loop(&self) -> bool {
        self.loop_enabled
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    pub fn is_autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn set_autoplay(&mut self, enabled: bool) {
        self.autoplay = enabled;
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn bump_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    pub fn reset_retry(&mut self) {
        self.retry_count = 0;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Copia de la cola para mostrarla
    pub fn info(&self) -> QueueInfo {
        QueueInfo {
            current: self.current.clone(),
            items: self.items.iter().cloned().collect(),
            state: self.state,
            loop_enabled: self.loop_enabled,
            shuffle: self.shuffle,
            autoplay: self.autoplay,
            volume: self.volume,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub state: PlaybackState,
    pub loop_enabled: bool,
    pub shuffle: bool,
    pub autoplay: bool,
    pub volume: u8,
}

impl QueueInfo {
    /// Obtiene una página específica de la cola
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.items.len();
        let total_pages = total_items.div_ceil(items_per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        QueuePage {
            items: self.items[start..end].to_vec(),
            offset: start,
            current_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    pub offset: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceType;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn track(title: &str) -> Track {
        Track::new(title, format!("https://www.youtube.com/watch?v={}", title), 60, "", "ana", SourceType::YouTube)
    }

    fn titles(queue: &MusicQueue) -> Vec<String> {
        queue.info().items.into_iter().map(|t| t.title).collect()
    }

    #[test]
    fn pending_order_is_fifo() {
        let mut queue = MusicQueue::new(100, 50);
        for title in ["A", "B", "C"] {
            queue.push(track(title));
        }
        queue.extend(vec![track("D"), track("E")]);

        let drained: Vec<String> = std::iter::from_fn(|| queue.pop_next()).map(|t| t.title).collect();
        assert_eq!(drained, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn history_is_bounded_and_evicts_oldest() {
        let mut queue = MusicQueue::new(100, 50);
        for i in 0..60 {
            queue.record_history(track(&i.to_string()));
        }

        assert_eq!(queue.history_len(), 50);
        assert_eq!(queue.last_played().map(|t| t.title.as_str()), Some("59"));
        assert_eq!(queue.history.front().map(|t| t.title.as_str()), Some("10"));
    }

    #[test]
    fn move_to_front_with_fixed_index() {
        let mut queue = MusicQueue::new(100, 50);
        queue.extend(vec![track("A"), track("B"), track("C")]);

        assert_eq!(queue.move_to_front(1).map(|t| t.title.clone()), Some("B".to_string()));
        assert_eq!(titles(&queue), vec!["B", "A", "C"]);
        assert!(queue.move_to_front(7).is_none());
    }

    #[test]
    fn shuffle_keeps_every_track_and_toggles_flag() {
        let mut queue = MusicQueue::new(100, 50);
        queue.extend((0..20).map(|i| track(&i.to_string())).collect());
        let mut rng = StdRng::seed_from_u64(7);

        assert!(queue.shuffle_with(&mut rng));
        let mut shuffled = titles(&queue);
        shuffled.sort();
        let mut expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        expected.sort();
        assert_eq!(shuffled, expected);

        assert!(!queue.shuffle_with(&mut rng));
    }

    #[test]
    fn clear_leaves_current_alone() {
        let mut queue = MusicQueue::new(100, 50);
        queue.set_current(Some(track("now")));
        queue.extend(vec![track("A"), track("B")]);

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.current().map(|t| t.title.as_str()), Some("now"));
    }

    #[test]
    fn random_index_stays_in_range() {
        let mut queue = MusicQueue::new(100, 50);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(queue.random_index(&mut rng), None);

        queue.extend(vec![track("A"), track("B"), track("C")]);
        for _ in 0..50 {
            assert!(queue.random_index(&mut rng).is_some_and(|i| i < 3));
        }
    }

    #[test]
    fn pages_are_clamped() {
        let mut queue = MusicQueue::new(100, 50);
        queue.extend((0..12).map(|i| track(&i.to_string())).collect());

        let page = queue.info().get_page(2, 10);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.offset, 10);
        assert_eq!(page.total_pages, 2);

        let past_end = queue.info().get_page(9, 10);
        assert_eq!(past_end.current_page, 2);

        let empty = MusicQueue::new(100, 50).info().get_page(1, 10);
        assert_eq!(empty.total_pages, 1);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn volume_is_capped() {
        let mut queue = MusicQueue::new(150, 50);
        assert_eq!(queue.volume(), 100);
        queue.set_volume(30);
        assert_eq!(queue.volume(), 30);
    }
}
