//! Ledger event construction for contract invocations.
//!
//! Each successful call emits one module event carrying the contract's
//! custom attributes, plus zero or more custom-typed events, namespaced with
//! a fixed prefix and tagged with the emitting module.

use ember_types::primitives::{address_display, Address};
use ember_types::response::{Event, EventAttribute};
use ember_types::system::{ATTR_KEY_CONTRACT_ADDR, CUSTOM_EVENT_PREFIX, MODULE_EVENT_TYPE};

use crate::context::TxContext;
use crate::error::KilnError;
use crate::keeper::Kiln;

const EVENT_TYPE_MIN_LENGTH: usize = 2;

/// Attributes prefixed with the emitting contract's address, with empty
/// keys/values rejected.
fn contract_event_attributes(
    custom: &[EventAttribute],
    contract: &Address,
) -> Result<Vec<EventAttribute>, KilnError> {
    let mut attrs = vec![EventAttribute::new(
        ATTR_KEY_CONTRACT_ADDR,
        address_display(contract),
    )];
    for attr in custom {
        let key = attr.key.trim();
        if key.is_empty() {
            return Err(KilnError::Invalid(format!(
                "empty attribute key, value: {}",
                attr.value
            )));
        }
        let value = attr.value.trim();
        if value.is_empty() {
            return Err(KilnError::Invalid(format!("empty attribute value, key: {key}")));
        }
        attrs.push(EventAttribute::new(key, value));
    }
    Ok(attrs)
}

/// The single module event emitted for a contract invocation with custom
/// attributes.
pub fn new_module_event(
    custom_attributes: &[EventAttribute],
    contract: &Address,
) -> Result<Vec<Event>, KilnError> {
    let attrs = contract_event_attributes(custom_attributes, contract)?;
    Ok(vec![Event {
        ty: MODULE_EVENT_TYPE.to_string(),
        attributes: attrs,
    }])
}

/// Convert contract-defined events into namespaced ledger events.
pub fn new_custom_events(events: &[Event], contract: &Address) -> Result<Vec<Event>, KilnError> {
    let mut out = Vec::with_capacity(events.len());
    for event in events {
        let ty = event.ty.trim();
        if ty.len() <= EVENT_TYPE_MIN_LENGTH {
            return Err(KilnError::Invalid(format!("event type too short: '{ty}'")));
        }
        let mut attributes = contract_event_attributes(&event.attributes, contract)?;
        attributes.push(EventAttribute::new("module", MODULE_EVENT_TYPE));
        out.push(Event {
            ty: format!("{CUSTOM_EVENT_PREFIX}{ty}"),
            attributes,
        });
    }
    Ok(out)
}

impl Kiln {
    /// Charge event costs and emit the module + custom events for one call.
    pub(crate) fn handle_response_events(
        &self,
        ctx: &TxContext,
        contract: &Address,
        attributes: &[EventAttribute],
        events: &[Event],
    ) -> Result<(), KilnError> {
        let cost = self.gas.event_costs(attributes, events);
        ctx.consume_gas(cost, "custom contract event attributes")?;
        if !attributes.is_empty() {
            ctx.emit_events(new_module_event(attributes, contract)?);
        }
        if !events.is_empty() {
            ctx.emit_events(new_custom_events(events, contract)?);
        }
        Ok(())
    }
}
