//! `{{ reference }}` resolution and interpolation.

pub mod variable_resolver;

pub use variable_resolver::{
    extract_references, lookup, render_template, resolve_reference, resolve_value_spec, value_to_text,
};
