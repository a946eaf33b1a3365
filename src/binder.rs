//! Parameter binding.
//!
//! A [`BindingPlan`] is computed once per method when the route table is
//! built. It fixes, for every declared parameter, where the value comes from:
//!
//! 1. a name equal to the id or id-extension token is consumed by the
//!    resolver and never bound;
//! 2. a body annotation reads the request body (at most one per method);
//! 3. a query annotation reads the first query value of that name;
//! 4. anything else reads the route value of that name.
//!
//! At request time [`BindingPlan::bind`] only follows the plan. A value that
//! is missing or fails coercion binds as null, unless the parameter is
//! required, in which case the request fails with 400.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::coerce::coerce;
use crate::descriptor::{Annotation, MethodDescriptor, ParamType};
use crate::error::ConfigError;
use crate::media::MediaTypeRegistry;
use crate::request::RequestContext;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    Route,
    Query,
    Body,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Slot {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub source: ParamSource,
    pub required: bool,
}

/// Per-method binding instructions, one slot per bound argument.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BindingPlan {
    slots: Vec<Slot>,
}

#[derive(Debug, thiserror::Error)]
pub enum BindingFailure {
    #[error("required parameter `{0}` is missing")]
    Missing(String),

    #[error("required parameter `{param}` could not be read: {reason}")]
    Unreadable { param: String, reason: String },
}

impl BindingPlan {
    pub fn build(method: &MethodDescriptor, id_token: &str, extension_token: &str) -> Result<Self, ConfigError> {
        let mut slots = Vec::with_capacity(method.params().len());
        let mut has_body = false;

        for param in method.params() {
            if param.name.eq_ignore_ascii_case(id_token) || param.name.eq_ignore_ascii_case(extension_token) {
                continue;
            }
            let source = match param.annotation {
                Some(Annotation::FromBody) => {
                    if has_body {
                        return Err(ConfigError::MultipleBodyParameters {
                            interface: method.interface().to_owned(),
                            method: method.name().to_owned(),
                        });
                    }
                    has_body = true;
                    ParamSource::Body
                }
                Some(Annotation::FromQuery) => ParamSource::Query,
                None                        => ParamSource::Route,
            };
            slots.push(Slot { name: param.name.clone(), ty: param.ty, source, required: param.required });
        }

        Ok(Self { slots })
    }

    pub fn slots(&self) -> &[Slot] { &self.slots }

    pub fn needs_body(&self) -> bool {
        self.slots.iter().any(|s| s.source == ParamSource::Body)
    }

    /// Binds every slot against `ctx`. The body is decoded with the request
    /// content type, or `default_media_type` when the request has none.
    pub fn bind(
        &self,
        ctx: &RequestContext,
        media: &MediaTypeRegistry,
        default_media_type: &str,
    ) -> Result<Vec<Value>, BindingFailure> {
        let mut args = Vec::with_capacity(self.slots.len());

        for slot in &self.slots {
            let bound = match slot.source {
                ParamSource::Route => ctx.param(&slot.name).and_then(|raw| coerce(raw, slot.ty)),
                ParamSource::Query => ctx.query(&slot.name).and_then(|raw| coerce(raw, slot.ty)),
                ParamSource::Body  => bind_body(slot, ctx, media, default_media_type)?,
            };

            match bound {
                Some(value) if !value.is_null() => args.push(value),
                _ if slot.required => {
                    warn!(param = %slot.name, source = ?slot.source, "required parameter could not be bound");
                    return Err(BindingFailure::Missing(slot.name.clone()));
                }
                _ => args.push(Value::Null),
            }
        }

        Ok(args)
    }
}

fn bind_body(
    slot: &Slot,
    ctx: &RequestContext,
    media: &MediaTypeRegistry,
    default_media_type: &str,
) -> Result<Option<Value>, BindingFailure> {
    if ctx.body().is_empty() {
        return Ok(None);
    }
    let content_type = ctx.content_type().unwrap_or(default_media_type);
    match media.deserialize(content_type, ctx.body(), slot.ty) {
        Ok(value) => Ok(Some(value)),
        Err(e) if slot.required => Err(BindingFailure::Unreadable {
            param: slot.name.clone(),
            reason: e.to_string(),
        }),
        Err(e) => {
            warn!(param = %slot.name, content_type, error = %e, "body could not be bound, passing null");
            Ok(None)
        }
    }
}
