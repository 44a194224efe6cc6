//! Type-keyed collections of polymorphic simulation data.
//!
//! A [`MoverDataCollection`] holds at most one block per concrete type. Input
//! commands, sync states and aux states each carry one, so new fragments of
//! state can be attached without changing the frame types themselves.

use crate::net::{MoverType, NetPayload, NetReader, NetSerializeError, NetWriter};
use crate::registry::TypeRegistry;

// ---------------------------------------------------------------------------
// MoverDataStruct
// ---------------------------------------------------------------------------

/// One fragment of input or state stored in a [`MoverDataCollection`].
pub trait MoverDataStruct: NetPayload + DataStructClone {
    /// Produces the blend of `self` (the "from" sample) toward `to`.
    ///
    /// `to` always has the same concrete type as `self`. The default snaps to
    /// whichever sample is nearer.
    fn interpolate(&self, to: &dyn MoverDataStruct, pct: f32) -> Box<dyn MoverDataStruct> {
        if pct < 0.5 {
            self.clone_box()
        } else {
            to.clone_box()
        }
    }

    /// Folds `from` into `self`, used when several inputs collapse into one.
    fn merge(&mut self, _from: &dyn MoverDataStruct) {}

    /// Fades out transient values when an input is reused.
    fn decay(&mut self, _amount: f32) {}

    /// Returns `true` if `self` diverges far enough from `authority` to need
    /// a correction. Only replicated fields may participate.
    fn should_reconcile(&self, _authority: &dyn MoverDataStruct) -> bool {
        false
    }
}

/// Cloning support for boxed [`MoverDataStruct`]s.
pub trait DataStructClone {
    /// Deep copy behind a new box.
    fn clone_box(&self) -> Box<dyn MoverDataStruct>;

    /// Copies `source` into `self` without reallocating. Returns `false` if
    /// the concrete types differ.
    fn assign_from(&mut self, source: &dyn MoverDataStruct) -> bool;
}

impl<T> DataStructClone for T
where
    T: MoverDataStruct + Clone,
{
    fn clone_box(&self) -> Box<dyn MoverDataStruct> {
        Box::new(self.clone())
    }

    fn assign_from(&mut self, source: &dyn MoverDataStruct) -> bool {
        match source.as_any().downcast_ref::<T>() {
            Some(source) => {
                self.clone_from(source);
                true
            }
            None => false,
        }
    }
}

impl dyn MoverDataStruct {
    /// Downcasts to a concrete data type.
    pub fn downcast_ref<T: MoverDataStruct>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Downcasts to a concrete data type, mutably.
    pub fn downcast_mut<T: MoverDataStruct>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

impl Clone for Box<dyn MoverDataStruct> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

// ---------------------------------------------------------------------------
// MoverDataCollection
// ---------------------------------------------------------------------------

/// A set of data blocks with at most one block per concrete type.
#[derive(Debug, Default)]
pub struct MoverDataCollection {
    data: Vec<Box<dyn MoverDataStruct>>,
}

impl Clone for MoverDataCollection {
    fn clone(&self) -> Self {
        Self {
            data: self.data.iter().map(|d| d.clone_box()).collect(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        let same_layout = self.data.len() == source.data.len()
            && self
                .data
                .iter()
                .zip(&source.data)
                .all(|(a, b)| a.type_tag() == b.type_tag());
        if same_layout {
            for (dst, src) in self.data.iter_mut().zip(&source.data) {
                dst.assign_from(src.as_ref());
            }
        } else {
            *self = source.clone();
        }
    }
}

impl MoverDataCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no blocks are held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Removes every block.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Iterates the held blocks.
    pub fn iter(&self) -> impl Iterator<Item = &dyn MoverDataStruct> {
        self.data.iter().map(|d| d.as_ref())
    }

    /// Inserts `block`, replacing any existing block of the same concrete type.
    pub fn add_or_overwrite_data(&mut self, block: Box<dyn MoverDataStruct>) {
        let tag = block.type_tag();
        self.data.retain(|d| d.type_tag() != tag);
        self.data.push(block);
    }

    /// Typed convenience over [`add_or_overwrite_data`](Self::add_or_overwrite_data).
    pub fn add<T: MoverDataStruct>(&mut self, value: T) {
        self.add_or_overwrite_data(Box::new(value));
    }

    /// Finds the first block that is `tag` or a subtype of it.
    pub fn find_data_by_tag(&self, tag: &str) -> Option<&dyn MoverDataStruct> {
        self.data.iter().find(|d| d.is_a(tag)).map(|d| d.as_ref())
    }

    /// Mutable form of [`find_data_by_tag`](Self::find_data_by_tag).
    pub fn find_data_by_tag_mut(&mut self, tag: &str) -> Option<&mut dyn MoverDataStruct> {
        match self.data.iter_mut().find(|d| d.is_a(tag)) {
            Some(d) => Some(d.as_mut()),
            None => None,
        }
    }

    fn find_exact(&self, tag: &str) -> Option<&dyn MoverDataStruct> {
        self.data
            .iter()
            .find(|d| d.type_tag() == tag)
            .map(|d| d.as_ref())
    }

    /// Finds the block of concrete type `T`.
    pub fn find<T: MoverDataStruct + MoverType>(&self) -> Option<&T> {
        self.find_exact(T::TAG).and_then(|d| d.downcast_ref::<T>())
    }

    /// Finds the block of concrete type `T`, mutably.
    pub fn find_mut<T: MoverDataStruct + MoverType>(&mut self) -> Option<&mut T> {
        self.data
            .iter_mut()
            .find(|d| d.type_tag() == T::TAG)
            .and_then(|d| d.downcast_mut::<T>())
    }

    /// Finds the block of type `T`, inserting a default one if absent.
    pub fn find_or_add_mut<T: MoverDataStruct + MoverType + Default>(&mut self) -> &mut T {
        let index = match self.data.iter().position(|d| d.type_tag() == T::TAG) {
            Some(index) => index,
            None => {
                self.data.push(Box::new(T::default()));
                self.data.len() - 1
            }
        };
        match self.data[index].downcast_mut::<T>() {
            Some(block) => block,
            None => unreachable!("block tagged {} is not a {}", T::TAG, T::TAG),
        }
    }

    /// Removes the block whose concrete type is `tag`. Returns `true` if one
    /// was removed.
    pub fn remove_data_by_tag(&mut self, tag: &str) -> bool {
        let before = self.data.len();
        self.data.retain(|d| d.type_tag() != tag);
        self.data.len() != before
    }

    // -----------------------------------------------------------------------
    // Blending
    // -----------------------------------------------------------------------

    /// Rebuilds `self` as the blend of `from` toward `to`.
    ///
    /// Types held by both are interpolated, types held by only one side are
    /// copied, so the result holds the union of both type sets.
    pub fn interpolate(&mut self, from: &MoverDataCollection, to: &MoverDataCollection, pct: f32) {
        self.data.clear();
        for from_block in &from.data {
            match to.find_exact(from_block.type_tag()) {
                Some(to_block) => self.data.push(from_block.interpolate(to_block, pct)),
                None => self.data.push(from_block.clone_box()),
            }
        }
        for to_block in &to.data {
            if from.find_exact(to_block.type_tag()).is_none() {
                self.data.push(to_block.clone_box());
            }
        }
    }

    /// Merges every block of `from` into the matching block of `self`,
    /// adopting blocks `self` does not hold yet.
    pub fn merge(&mut self, from: &MoverDataCollection) {
        for from_block in &from.data {
            match self
                .data
                .iter_mut()
                .find(|d| d.type_tag() == from_block.type_tag())
            {
                Some(block) => block.merge(from_block.as_ref()),
                None => self.data.push(from_block.clone_box()),
            }
        }
    }

    /// Decays every block by `amount` (0 = untouched, 1 = fully decayed).
    pub fn decay(&mut self, amount: f32) {
        for block in &mut self.data {
            block.decay(amount);
        }
    }

    /// Returns `true` if `self` and `authority` hold different type sets or
    /// any matching pair reports divergence.
    pub fn should_reconcile(&self, authority: &MoverDataCollection) -> bool {
        if self.data.len() != authority.data.len() {
            return true;
        }
        self.data
            .iter()
            .any(|block| match authority.find_exact(block.type_tag()) {
                Some(other) => block.should_reconcile(other),
                None => true,
            })
    }

    // -----------------------------------------------------------------------
    // Wire
    // -----------------------------------------------------------------------

    /// Writes `count + (tag, body)*`.
    pub fn net_serialize(&self, writer: &mut NetWriter) -> Result<(), NetSerializeError> {
        crate::net::write_payload_array(writer, &self.data)
    }

    /// Replaces the contents with the collection read from `reader`.
    ///
    /// Blocks whose type is already held are decoded in place. A descriptor
    /// that is not a registered concrete data type fails the read with
    /// [`NetSerializeError::ProtocolViolation`] and marks the stream errored.
    pub fn net_deserialize(
        &mut self,
        reader: &mut NetReader<'_>,
        registry: &TypeRegistry<dyn MoverDataStruct>,
    ) -> Result<(), NetSerializeError> {
        let count = reader.read_u8()? as usize;
        let mut previous = std::mem::take(&mut self.data);

        for _ in 0..count {
            let tag = reader.read_tag()?;
            if !registry.is_instantiable(tag) {
                return reader.fail(NetSerializeError::ProtocolViolation {
                    tag: tag.to_string(),
                    expected_base: registry.base_name(),
                });
            }

            let mut block = match previous.iter().position(|d| d.type_tag() == tag) {
                Some(index) => previous.swap_remove(index),
                None => match registry.instantiate(tag) {
                    Ok(block) => block,
                    Err(err) => return reader.fail(err),
                },
            };
            block.net_deserialize(reader)?;
            self.add_or_overwrite_data(block);
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "data_collection_tests.rs"]
mod tests;
