//! Typed entity views and the attribute catalog.

pub mod catalog;
pub mod objects;
pub mod rules;

pub use catalog::{
    named_color_code, object_catalog, rule_catalog, AttributeSpan, NAMED_COLORS, NAMED_COLOR_EPOCH,
};
pub use objects::{
    dynamic_filter_tags, AddrType, Address, AddressGroup, GroupMembership, Service, ServiceGroup,
    Tag,
};
pub use rules::{NatRule, SecurityRule};
