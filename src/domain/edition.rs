use std::{fmt, num::NonZeroU32};

use serde::{Deserialize, Serialize};

use super::{
    error::DomainError,
    seed::{EditionHash, Seed, derive_hash},
};

/// One-based edition number. IDs of a run always form the range `1..=N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditionId(NonZeroU32);

impl EditionId {
    pub fn new(value: u32) -> Result<Self, DomainError> {
        NonZeroU32::new(value)
            .map(Self)
            .ok_or_else(|| DomainError::validation("edition ids start at 1"))
    }

    /// ID of the edition stored at a zero-based position.
    pub fn from_index(index: usize) -> Result<Self, DomainError> {
        index
            .checked_add(1)
            .and_then(|value| u32::try_from(value).ok())
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or_else(|| DomainError::validation(format!("edition index {index} out of range")))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub(crate) fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl From<NonZeroU32> for EditionId {
    fn from(value: NonZeroU32) -> Self {
        Self(value)
    }
}

impl fmt::Display for EditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The full, contiguous ID range of a run of `count` editions.
pub fn edition_range(count: NonZeroU32) -> impl Iterator<Item = EditionId> {
    (1..=count.get()).filter_map(NonZeroU32::new).map(EditionId)
}

/// The two files persisted and published for every edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Artifact,
    Thumbnail,
}

impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Artifact, AssetKind::Thumbnail];

    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Artifact => "artifact",
            AssetKind::Thumbnail => "thumbnail",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AssetKind::Artifact => "html",
            AssetKind::Thumbnail => "png",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier returned by the content-addressed storage service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::validation("content id must not be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Both identifiers of a fully published edition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub artifact: ContentId,
    pub thumbnail: ContentId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditionStage {
    Pending,
    Generated,
    Captured,
}

impl EditionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            EditionStage::Pending => "pending",
            EditionStage::Generated => "generated",
            EditionStage::Captured => "captured",
        }
    }
}

impl fmt::Display for EditionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Edition {
    id: EditionId,
    seed: Seed,
    hash: EditionHash,
    stage: EditionStage,
}

impl Edition {
    pub fn pending(id: EditionId, seed: Seed) -> Self {
        let hash = derive_hash(&seed);
        Self {
            id,
            seed,
            hash,
            stage: EditionStage::Pending,
        }
    }

    pub fn id(&self) -> EditionId {
        self.id
    }

    pub fn seed(&self) -> &Seed {
        &self.seed
    }

    pub fn hash(&self) -> &EditionHash {
        &self.hash
    }

    pub fn stage(&self) -> EditionStage {
        self.stage
    }

    pub fn mark_generated(&mut self) -> Result<(), DomainError> {
        self.advance(EditionStage::Pending, EditionStage::Generated)
    }

    pub fn mark_captured(&mut self) -> Result<(), DomainError> {
        self.advance(EditionStage::Generated, EditionStage::Captured)
    }

    fn advance(&mut self, from: EditionStage, to: EditionStage) -> Result<(), DomainError> {
        if self.stage != from {
            return Err(DomainError::invariant(format!(
                "edition {} cannot move to `{to}` from `{}`",
                self.id, self.stage
            )));
        }
        self.stage = to;
        Ok(())
    }
}

/// Every edition of a run, ordered by ID, covering exactly `1..=N`.
#[derive(Debug, Clone)]
pub struct EditionSet {
    editions: Vec<Edition>,
}

impl EditionSet {
    /// `count` editions with fresh random seeds.
    pub fn new(count: u32) -> Result<Self, DomainError> {
        let count = NonZeroU32::new(count)
            .ok_or_else(|| DomainError::validation("a run needs at least one edition"))?;
        Ok(Self {
            editions: edition_range(count)
                .map(|id| Edition::pending(id, Seed::generate()))
                .collect(),
        })
    }

    /// One edition per seed; the first seed becomes edition 1.
    pub fn from_seeds(seeds: Vec<Seed>) -> Result<Self, DomainError> {
        if seeds.is_empty() {
            return Err(DomainError::validation("a run needs at least one edition"));
        }
        let editions = seeds
            .into_iter()
            .enumerate()
            .map(|(index, seed)| EditionId::from_index(index).map(|id| Edition::pending(id, seed)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { editions })
    }

    pub fn len(&self) -> usize {
        self.editions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.editions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edition> {
        self.editions.iter()
    }

    pub fn into_vec(self) -> Vec<Edition> {
        self.editions
    }
}
