//! Wire-tag registries for the polymorphic simulation types.
//!
//! Each base kind (data structs, layered moves, movement modifiers) has its
//! own [`TypeRegistry`]. Deserialization only ever builds types found in the
//! registry for the collection being read, so a forged descriptor cannot
//! make the receiver construct an arbitrary type.

use std::collections::HashMap;

use thiserror::Error;

use crate::data_collection::MoverDataStruct;
use crate::default_data::{
    CharacterDefaultInputs, INPUT_DATA_TAG, MoverDefaultSyncState, SYNC_STATE_DATA_TAG,
};
use crate::layered_move::LayeredMove;
use crate::layered_move::builtin::{
    AnimRootMotionMove, JumpImpulseMove, LaunchMove, LinearVelocityMove, MoveToMove,
};
use crate::movement_modifier::MovementModifier;
use crate::movement_modifier::builtin::{ModeRemapModifier, SpeedScaleModifier};
use crate::net::{MoverType, NetSerializeError};

/// Errors that can occur while building a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A type with the same tag is already registered.
    #[error("duplicate type tag: {0}")]
    DuplicateTag(&'static str),
}

/// One registered type.
pub struct TypeEntry<P: ?Sized> {
    /// Wire tag.
    pub tag: &'static str,
    /// Parent tags, nearest first.
    pub parents: &'static [&'static str],
    /// Builds a default-initialised instance. `None` for abstract types.
    factory: Option<fn() -> Box<P>>,
}

/// Maps wire tags to factories for one base kind.
pub struct TypeRegistry<P: ?Sized> {
    base_name: &'static str,
    entries: HashMap<&'static str, TypeEntry<P>>,
}

impl<P: ?Sized> TypeRegistry<P> {
    /// Creates an empty registry for the base kind named `base_name`.
    pub fn new(base_name: &'static str) -> Self {
        Self {
            base_name,
            entries: HashMap::new(),
        }
    }

    /// Name of the base kind, used in protocol errors.
    pub fn base_name(&self) -> &'static str {
        self.base_name
    }

    /// Registers a concrete type with its factory.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTag`] if `tag` is already present.
    pub fn register(
        &mut self,
        tag: &'static str,
        parents: &'static [&'static str],
        factory: fn() -> Box<P>,
    ) -> Result<(), RegistryError> {
        self.insert(TypeEntry {
            tag,
            parents,
            factory: Some(factory),
        })
    }

    /// Registers an abstract type. It participates in subtype checks but can
    /// never be instantiated from the wire.
    pub fn register_abstract(
        &mut self,
        tag: &'static str,
        parents: &'static [&'static str],
    ) -> Result<(), RegistryError> {
        self.insert(TypeEntry {
            tag,
            parents,
            factory: None,
        })
    }

    fn insert(&mut self, entry: TypeEntry<P>) -> Result<(), RegistryError> {
        if self.entries.contains_key(entry.tag) {
            return Err(RegistryError::DuplicateTag(entry.tag));
        }
        self.entries.insert(entry.tag, entry);
        Ok(())
    }

    /// Returns `true` if `tag` is registered (abstract or concrete).
    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    /// Returns `true` if `tag` names a registered concrete type.
    pub fn is_instantiable(&self, tag: &str) -> bool {
        self.entries.get(tag).is_some_and(|e| e.factory.is_some())
    }

    /// Returns `true` if `tag` is `ancestor` or (transitively) derives from it.
    pub fn is_child_of(&self, tag: &str, ancestor: &str) -> bool {
        let mut pending = vec![tag];
        while let Some(current) = pending.pop() {
            if current == ancestor {
                return true;
            }
            if let Some(entry) = self.entries.get(current) {
                pending.extend(entry.parents.iter().copied());
            }
        }
        false
    }

    /// Builds a default instance of the type named `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`NetSerializeError::ProtocolViolation`] if the tag is unknown
    /// or abstract.
    pub fn instantiate(&self, tag: &str) -> Result<Box<P>, NetSerializeError> {
        match self.entries.get(tag).and_then(|e| e.factory) {
            Some(factory) => Ok(factory()),
            None => Err(NetSerializeError::ProtocolViolation {
                tag: tag.to_string(),
                expected_base: self.base_name,
            }),
        }
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MoverTypeRegistry
// ---------------------------------------------------------------------------

/// The registries for every polymorphic kind the simulation replicates.
pub struct MoverTypeRegistry {
    /// Input and sync-state fragments.
    pub data: TypeRegistry<dyn MoverDataStruct>,
    /// Layered moves.
    pub layered_moves: TypeRegistry<dyn LayeredMove>,
    /// Movement modifiers.
    pub modifiers: TypeRegistry<dyn MovementModifier>,
}

impl MoverTypeRegistry {
    /// Creates registries with nothing registered.
    pub fn new() -> Self {
        Self {
            data: TypeRegistry::new("MoverDataStruct"),
            layered_moves: TypeRegistry::new("LayeredMove"),
            modifiers: TypeRegistry::new("MovementModifier"),
        }
    }

    /// Creates registries holding every built-in type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register_builtin_types()
            .unwrap_or_else(|err| unreachable!("built-in tags are unique: {err}"));
        registry
    }

    fn register_builtin_types(&mut self) -> Result<(), RegistryError> {
        self.data.register_abstract(INPUT_DATA_TAG, &[])?;
        self.data.register_abstract(SYNC_STATE_DATA_TAG, &[])?;
        self.register_data::<CharacterDefaultInputs>()?;
        self.register_data::<MoverDefaultSyncState>()?;

        self.register_layered_move::<LinearVelocityMove>()?;
        self.register_layered_move::<JumpImpulseMove>()?;
        self.register_layered_move::<LaunchMove>()?;
        self.register_layered_move::<MoveToMove>()?;
        self.register_layered_move::<AnimRootMotionMove>()?;

        self.register_modifier::<SpeedScaleModifier>()?;
        self.register_modifier::<ModeRemapModifier>()?;
        Ok(())
    }

    /// Registers a data struct type.
    pub fn register_data<T>(&mut self) -> Result<(), RegistryError>
    where
        T: MoverDataStruct + MoverType + Default,
    {
        self.data.register(T::TAG, T::PARENTS, || -> Box<dyn MoverDataStruct> {
            Box::new(T::default())
        })
    }

    /// Registers a layered move type.
    pub fn register_layered_move<T>(&mut self) -> Result<(), RegistryError>
    where
        T: LayeredMove + MoverType + Default,
    {
        self.layered_moves
            .register(T::TAG, T::PARENTS, || -> Box<dyn LayeredMove> {
                Box::new(T::default())
            })
    }

    /// Registers a movement modifier type.
    pub fn register_modifier<T>(&mut self) -> Result<(), RegistryError>
    where
        T: MovementModifier + MoverType + Default,
    {
        self.modifiers
            .register(T::TAG, T::PARENTS, || -> Box<dyn MovementModifier> {
                Box::new(T::default())
            })
    }
}

impl Default for MoverTypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
