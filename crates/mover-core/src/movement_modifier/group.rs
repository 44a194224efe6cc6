use tracing::{debug, trace};

use super::{ModifierHandle, MovementModifier};
use crate::blackboard::MoverBlackboard;
use crate::environment::MovementEnvironment;
use crate::net::{self, NetReader, NetSerializeError, NetWriter};
use crate::registry::TypeRegistry;

/// Queued and active movement modifiers of one mover.
#[derive(Debug, Default, Clone)]
pub struct MovementModifierGroup {
    active: Vec<Box<dyn MovementModifier>>,
    queued: Vec<Box<dyn MovementModifier>>,
}

impl MovementModifierGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `modifier` to start at the next flush and returns its handle.
    pub fn queue_modifier(&mut self, modifier: Box<dyn MovementModifier>) -> ModifierHandle {
        let handle = modifier.base().handle;
        trace!(modifier = %modifier.describe(), "movement modifier queued");
        self.queued.push(modifier);
        handle
    }

    /// Makes every active or queued modifier bearing `handle` finish at the
    /// next flush.
    pub fn cancel_modifier_from_handle(&mut self, handle: ModifierHandle) {
        if !handle.is_valid() {
            return;
        }
        for modifier in self.active.iter_mut().chain(self.queued.iter_mut()) {
            if modifier.base().handle == handle {
                modifier.base_mut().duration_ms = 0.0;
                debug!(modifier = %modifier.describe(), "movement modifier cancelled");
            }
        }
    }

    /// Active or queued modifier bearing `handle`.
    pub fn find_modifier(&self, handle: ModifierHandle) -> Option<&dyn MovementModifier> {
        if !handle.is_valid() {
            return None;
        }
        self.active
            .iter()
            .chain(self.queued.iter())
            .find(|m| m.base().handle == handle)
            .map(|m| m.as_ref())
    }

    /// Returns `true` if any active or queued modifier has concrete type `tag`.
    pub fn has_modifier_of_tag(&self, tag: &str) -> bool {
        self.active
            .iter()
            .chain(self.queued.iter())
            .any(|m| m.type_tag() == tag)
    }

    pub fn active_modifiers(&self) -> &[Box<dyn MovementModifier>] {
        &self.active
    }

    pub fn active_modifiers_mut(&mut self) -> &mut [Box<dyn MovementModifier>] {
        &mut self.active
    }

    pub fn queued_modifiers(&self) -> &[Box<dyn MovementModifier>] {
        &self.queued
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.queued.is_empty()
    }

    /// Flushes and returns the modifiers in effect this tick.
    pub fn generate_active_modifiers(
        &mut self,
        environment: &MovementEnvironment,
        blackboard: &mut MoverBlackboard,
        current_sim_time_ms: f64,
    ) -> &mut [Box<dyn MovementModifier>] {
        self.flush_modifier_arrays(environment, blackboard, current_sim_time_ms);
        &mut self.active
    }

    /// Ends finished modifiers, then promotes queued ones.
    ///
    /// Promotion de-duplicates: a queued modifier that matches an active one
    /// is dropped, handing its handle to the active instance if that one
    /// has none. A modifier cancelled while still queued is started and
    /// ended within the same flush.
    pub fn flush_modifier_arrays(
        &mut self,
        environment: &MovementEnvironment,
        blackboard: &mut MoverBlackboard,
        current_sim_time_ms: f64,
    ) {
        self.end_finished(environment, blackboard, current_sim_time_ms);

        let mut promoted_any = false;
        for mut queued in std::mem::take(&mut self.queued) {
            if let Some(existing) = self
                .active
                .iter_mut()
                .find(|active| active.matches(queued.as_ref()))
            {
                let handle = queued.base().handle;
                if !existing.base().handle.is_valid() && handle.is_valid() {
                    existing.base_mut().handle = handle;
                }
                debug!(
                    modifier = %queued.describe(),
                    "dropping queued movement modifier that matches an active one"
                );
                continue;
            }

            queued.base_mut().start_sim_time_ms = current_sim_time_ms;
            queued.on_start(environment, blackboard);
            debug!(modifier = %queued.describe(), "movement modifier started");
            self.active.push(queued);
            promoted_any = true;
        }

        if promoted_any {
            self.end_finished(environment, blackboard, current_sim_time_ms);
        }
    }

    fn end_finished(
        &mut self,
        environment: &MovementEnvironment,
        blackboard: &mut MoverBlackboard,
        current_sim_time_ms: f64,
    ) {
        let mut index = 0;
        while index < self.active.len() {
            if self.active[index].base().is_finished(current_sim_time_ms) {
                let mut finished = self.active.remove(index);
                finished.on_end(environment, blackboard);
                debug!(modifier = %finished.describe(), "movement modifier ended");
            } else {
                index += 1;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Wire
    // -----------------------------------------------------------------------

    /// Writes at most `max_modifiers` modifiers, active ones first.
    pub fn net_serialize(
        &self,
        writer: &mut NetWriter,
        max_modifiers: u8,
    ) -> Result<(), NetSerializeError> {
        let max = usize::from(max_modifiers);
        let active_count = self.active.len().min(max);
        let queued_count = self.queued.len().min(max - active_count);
        net::write_payload_array(writer, &self.active[..active_count])?;
        net::write_payload_array(writer, &self.queued[..queued_count])
    }

    /// Reads both lists. Handles are local, so a received modifier keeps the
    /// handle of the local instance it replaces. Nothing changes on error.
    pub fn net_deserialize(
        &mut self,
        reader: &mut NetReader<'_>,
        registry: &TypeRegistry<dyn MovementModifier>,
    ) -> Result<(), NetSerializeError> {
        let active = read_keeping_handles(reader, registry, self.active.clone())?;
        let queued = read_keeping_handles(reader, registry, self.queued.clone())?;
        self.active = active;
        self.queued = queued;
        Ok(())
    }
}

fn read_keeping_handles(
    reader: &mut NetReader<'_>,
    registry: &TypeRegistry<dyn MovementModifier>,
    existing: Vec<Box<dyn MovementModifier>>,
) -> Result<Vec<Box<dyn MovementModifier>>, NetSerializeError> {
    let local: Vec<(&'static str, ModifierHandle)> = existing
        .iter()
        .map(|m| (m.type_tag(), m.base().handle))
        .collect();
    let mut received = net::read_payload_array(reader, registry, existing)?;
    for (index, modifier) in received.iter_mut().enumerate() {
        if let Some(&(tag, handle)) = local.get(index)
            && tag == modifier.type_tag()
        {
            modifier.base_mut().handle = handle;
        }
    }
    Ok(received)
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
