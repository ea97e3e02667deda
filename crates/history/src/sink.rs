use tracing::warn;

use crate::card::CardContent;
use crate::record::{Record, RecordId, RecordStatus};

/// The visual surface the reconciler drives. Implementations must apply each
/// call without disturbing unrelated elements.
pub trait RenderSink: Send {
    fn create(&mut self, id: &RecordId, record: &Record, position: usize);

    fn update_content(&mut self, id: &RecordId, record: &Record);

    fn move_to(&mut self, id: &RecordId, position: usize);

    fn remove(&mut self, id: &RecordId);

    /// Show or hide the "no history yet" placeholder.
    fn set_placeholder(&mut self, visible: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: RecordId,
    pub status: RecordStatus,
    pub content: CardContent,
    /// Stays the same for as long as the element exists.
    pub serial: u64,
    /// Bumped every time the content is regenerated.
    pub revision: u32,
}

/// Counts of applied sink calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub created: usize,
    pub updated: usize,
    pub moved: usize,
    pub removed: usize,
}

impl SinkStats {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.moved + self.removed
    }
}

/// In-memory ordered list of cards.
#[derive(Debug, Default)]
pub struct CardList {
    cards: Vec<Card>,
    placeholder: bool,
    next_serial: u64,
    stats: SinkStats,
}

impl CardList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn get(&self, id: &RecordId) -> Option<&Card> {
        self.cards.iter().find(|c| &c.id == id)
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.cards.iter().map(|c| c.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn placeholder_visible(&self) -> bool {
        self.placeholder
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    fn index_of(&self, id: &RecordId) -> Option<usize> {
        self.cards.iter().position(|c| &c.id == id)
    }
}

impl RenderSink for CardList {
    fn create(&mut self, id: &RecordId, record: &Record, position: usize) {
        if self.index_of(id).is_some() {
            warn!("Card {} already exists, ignoring create", id);
            return;
        }
        self.next_serial += 1;
        let card = Card {
            id: id.clone(),
            status: record.status,
            content: CardContent::from_record(record),
            serial: self.next_serial,
            revision: 0,
        };
        let position = position.min(self.cards.len());
        self.cards.insert(position, card);
        self.stats.created += 1;
    }

    fn update_content(&mut self, id: &RecordId, record: &Record) {
        match self.index_of(id) {
            Some(index) => {
                let card = &mut self.cards[index];
                card.status = record.status;
                card.content = CardContent::from_record(record);
                card.revision += 1;
                self.stats.updated += 1;
            }
            None => warn!("Card {} not found, ignoring update", id),
        }
    }

    fn move_to(&mut self, id: &RecordId, position: usize) {
        match self.index_of(id) {
            Some(index) => {
                let card = self.cards.remove(index);
                let position = position.min(self.cards.len());
                self.cards.insert(position, card);
                self.stats.moved += 1;
            }
            None => warn!("Card {} not found, ignoring move", id),
        }
    }

    fn remove(&mut self, id: &RecordId) {
        match self.index_of(id) {
            Some(index) => {
                self.cards.remove(index);
                self.stats.removed += 1;
            }
            None => warn!("Card {} not found, ignoring remove", id),
        }
    }

    fn set_placeholder(&mut self, visible: bool) {
        self.placeholder = visible;
    }
}
