//! Edition ID to content identifier mapping for one build run.
//!
//! The ledger is pre-sized to the run's edition count and indexed by
//! `EditionId - 1`. Each identifier slot is written at most once; a second
//! write keeps the first value and is reported as [`LedgerError::AlreadyRecorded`].
//! Readers only ever observe complete publications (both identifiers set).

use thiserror::Error;

use super::edition::{AssetKind, ContentId, EditionId, Publication};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("edition {id} is outside the ledger range 1..={capacity}")]
    UnknownEdition { id: EditionId, capacity: usize },
    #[error(
        "{kind} content id for edition {id} is already `{existing}`; refusing to overwrite with `{attempted}`"
    )]
    AlreadyRecorded {
        id: EditionId,
        kind: AssetKind,
        existing: ContentId,
        attempted: ContentId,
    },
}

#[derive(Debug, Clone, Default)]
struct Slot {
    artifact: Option<ContentId>,
    thumbnail: Option<ContentId>,
}

impl Slot {
    fn entry(&mut self, kind: AssetKind) -> &mut Option<ContentId> {
        match kind {
            AssetKind::Artifact => &mut self.artifact,
            AssetKind::Thumbnail => &mut self.thumbnail,
        }
    }

    fn get(&self, kind: AssetKind) -> Option<&ContentId> {
        match kind {
            AssetKind::Artifact => self.artifact.as_ref(),
            AssetKind::Thumbnail => self.thumbnail.as_ref(),
        }
    }

    fn publication(&self) -> Option<Publication> {
        match (&self.artifact, &self.thumbnail) {
            (Some(artifact), Some(thumbnail)) => Some(Publication {
                artifact: artifact.clone(),
                thumbnail: thumbnail.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublicationLedger {
    slots: Vec<Slot>,
}

impl PublicationLedger {
    pub fn with_capacity(editions: usize) -> Self {
        Self {
            slots: vec![Slot::default(); editions],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn record(
        &mut self,
        id: EditionId,
        kind: AssetKind,
        content_id: ContentId,
    ) -> Result<(), LedgerError> {
        let capacity = self.slots.len();
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or(LedgerError::UnknownEdition { id, capacity })?;

        let entry = slot.entry(kind);
        if let Some(existing) = entry.as_ref() {
            return Err(LedgerError::AlreadyRecorded {
                id,
                kind,
                existing: existing.clone(),
                attempted: content_id,
            });
        }
        *entry = Some(content_id);
        Ok(())
    }

    /// Single identifier lookup, regardless of whether its sibling is set.
    pub fn get(&self, id: EditionId, kind: AssetKind) -> Option<&ContentId> {
        self.slots.get(id.index()).and_then(|slot| slot.get(kind))
    }

    /// The publication of an edition, present only once both uploads succeeded.
    pub fn publication(&self, id: EditionId) -> Option<Publication> {
        self.slots.get(id.index()).and_then(Slot::publication)
    }

    pub fn publications(&self) -> impl Iterator<Item = (EditionId, Publication)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let id = EditionId::from_index(index).ok()?;
            slot.publication().map(|publication| (id, publication))
        })
    }

    pub fn published(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.publication().is_some())
            .count()
    }

    /// Editions still lacking at least one identifier, in ID order.
    pub fn missing(&self) -> Vec<EditionId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.publication().is_none())
            .filter_map(|(index, _)| EditionId::from_index(index).ok())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|slot| slot.publication().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: u32) -> EditionId {
        EditionId::new(value).expect("valid id")
    }

    fn cid(value: &str) -> ContentId {
        ContentId::new(value).expect("valid cid")
    }

    #[test]
    fn first_recorded_identifier_wins() {
        let mut ledger = PublicationLedger::with_capacity(2);

        ledger
            .record(id(1), AssetKind::Artifact, cid("first"))
            .expect("first write");
        let err = ledger
            .record(id(1), AssetKind::Artifact, cid("second"))
            .expect_err("second write must be refused");

        assert_eq!(
            err,
            LedgerError::AlreadyRecorded {
                id: id(1),
                kind: AssetKind::Artifact,
                existing: cid("first"),
                attempted: cid("second"),
            }
        );
        assert_eq!(ledger.get(id(1), AssetKind::Artifact), Some(&cid("first")));
    }

    #[test]
    fn publication_requires_both_identifiers() {
        let mut ledger = PublicationLedger::with_capacity(1);
        ledger
            .record(id(1), AssetKind::Thumbnail, cid("thumb"))
            .expect("thumbnail write");

        assert!(ledger.publication(id(1)).is_none());
        assert_eq!(ledger.missing(), vec![id(1)]);
        assert!(!ledger.is_complete());

        ledger
            .record(id(1), AssetKind::Artifact, cid("art"))
            .expect("artifact write");

        let publication = ledger.publication(id(1)).expect("complete publication");
        assert_eq!(publication.artifact, cid("art"));
        assert_eq!(publication.thumbnail, cid("thumb"));
        assert!(ledger.is_complete());
    }

    #[test]
    fn ids_outside_the_run_are_rejected() {
        let mut ledger = PublicationLedger::with_capacity(3);
        let err = ledger
            .record(id(4), AssetKind::Artifact, cid("x"))
            .expect_err("out of range");
        assert_eq!(
            err,
            LedgerError::UnknownEdition {
                id: id(4),
                capacity: 3
            }
        );
    }

    #[test]
    fn publications_are_listed_in_id_order() {
        let mut ledger = PublicationLedger::with_capacity(3);
        for value in [3, 1] {
            for kind in AssetKind::ALL {
                ledger
                    .record(id(value), kind, cid(&format!("{kind}-{value}")))
                    .expect("write");
            }
        }

        let ids: Vec<u32> = ledger.publications().map(|(id, _)| id.get()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(ledger.published(), 2);
        assert_eq!(ledger.missing(), vec![id(2)]);
    }
}
