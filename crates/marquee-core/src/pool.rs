//! Media element pool
//!
//! Elements are created once and handed out by index; `recycle` resets an
//! element and returns it to the free list. The ad element and the autoplay
//! test element live outside the free list.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Index of an element in its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub usize);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ElementState {
    src: Option<String>,
    paused: bool,
    muted: bool,
    volume: u8,
    playback_rate: f64,
}

impl Default for ElementState {
    fn default() -> Self {
        Self {
            src: None,
            paused: true,
            muted: false,
            volume: 100,
            playback_rate: 1.0,
        }
    }
}

/// A playback surface a provider renders into
#[derive(Debug)]
pub struct MediaElement {
    id: ElementId,
    state: Mutex<ElementState>,
}

impl MediaElement {
    fn new(id: ElementId) -> Self {
        Self {
            id,
            state: Mutex::new(ElementState::default()),
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn src(&self) -> Option<String> {
        self.state.lock().src.clone()
    }

    pub fn set_src(&self, src: Option<String>) {
        self.state.lock().src = src;
    }

    /// No source attached, or an empty one
    pub fn has_blank_source(&self) -> bool {
        self.state.lock().src.as_deref().map_or(true, str::is_empty)
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
    }

    pub fn muted(&self) -> bool {
        self.state.lock().muted
    }

    pub fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    pub fn volume(&self) -> u8 {
        self.state.lock().volume
    }

    pub fn set_volume(&self, volume: u8) {
        self.state.lock().volume = volume.min(100);
    }

    pub fn playback_rate(&self) -> f64 {
        self.state.lock().playback_rate
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.state.lock().playback_rate = rate;
    }

    /// Drop the source and stop, keeping mute and volume
    fn reset(&self) {
        let mut state = self.state.lock();
        state.src = None;
        state.paused = true;
        state.playback_rate = 1.0;
    }
}

/// The player's visible element slot
#[derive(Debug, Default)]
pub struct MediaContainer {
    elements: Mutex<Vec<ElementId>>,
}

impl MediaContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element; appending an element already present is a no-op
    pub fn append(&self, element: &MediaElement) {
        let mut elements = self.elements.lock();
        if !elements.contains(&element.id()) {
            elements.push(element.id());
        }
    }

    /// Remove an element, returning whether it was present
    pub fn remove(&self, element: &MediaElement) -> bool {
        let mut elements = self.elements.lock();
        let before = elements.len();
        elements.retain(|id| *id != element.id());
        elements.len() != before
    }

    pub fn contains(&self, element: &MediaElement) -> bool {
        self.elements.lock().contains(&element.id())
    }

    pub fn len(&self) -> usize {
        self.elements.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.lock().is_empty()
    }
}

struct PoolInner {
    elements: Vec<Arc<MediaElement>>,
    free: Vec<usize>,
    muted: bool,
    volume: u8,
}

/// Fixed set of primed media elements shared by all controllers
pub struct MediaPool {
    inner: Mutex<PoolInner>,
    test_element: Arc<MediaElement>,
    ad_element: Arc<MediaElement>,
}

impl MediaPool {
    /// Create a pool with `size` primed elements
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let elements: Vec<_> = (0..size)
            .map(|i| Arc::new(MediaElement::new(ElementId(i))))
            .collect();
        let free = (0..size).rev().collect();
        Self {
            inner: Mutex::new(PoolInner {
                elements,
                free,
                muted: false,
                volume: 100,
            }),
            test_element: Arc::new(MediaElement::new(ElementId(usize::MAX))),
            ad_element: Arc::new(MediaElement::new(ElementId(usize::MAX - 1))),
        }
    }

    /// Check out an element; the pool grows when every element is in use
    pub fn get_primed_element(&self) -> Arc<MediaElement> {
        let mut inner = self.inner.lock();
        let index = match inner.free.pop() {
            Some(index) => index,
            None => {
                let index = inner.elements.len();
                debug!(index, "Media pool exhausted, adding element");
                inner
                    .elements
                    .push(Arc::new(MediaElement::new(ElementId(index))));
                index
            }
        };
        let element = inner.elements[index].clone();
        element.set_muted(inner.muted);
        element.set_volume(inner.volume);
        element
    }

    /// Return an element to the pool.
    ///
    /// The ad and test elements are only reset.
    pub fn recycle(&self, element: &Arc<MediaElement>) {
        element.reset();
        if Arc::ptr_eq(element, &self.ad_element) || Arc::ptr_eq(element, &self.test_element) {
            return;
        }
        let mut inner = self.inner.lock();
        let index = element.id().0;
        let owned = inner
            .elements
            .get(index)
            .map_or(false, |e| Arc::ptr_eq(e, element));
        if owned && !inner.free.contains(&index) {
            inner.free.push(index);
        }
    }

    /// Apply the mute setting to every element
    pub fn sync_mute(&self, muted: bool) {
        let mut inner = self.inner.lock();
        inner.muted = muted;
        for element in &inner.elements {
            element.set_muted(muted);
        }
        self.ad_element.set_muted(muted);
    }

    /// Apply the volume to every element
    pub fn sync_volume(&self, volume: u8) {
        let mut inner = self.inner.lock();
        inner.volume = volume.min(100);
        for element in &inner.elements {
            element.set_volume(volume);
        }
        self.ad_element.set_volume(volume);
    }

    /// Element used for autoplay probing
    pub fn test_element(&self) -> Arc<MediaElement> {
        self.test_element.clone()
    }

    /// Element reserved for ad playback
    pub fn ad_element(&self) -> Arc<MediaElement> {
        self.ad_element.clone()
    }

    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().elements.len()
    }
}

impl Default for MediaPool {
    fn default() -> Self {
        Self::new(3)
    }
}
