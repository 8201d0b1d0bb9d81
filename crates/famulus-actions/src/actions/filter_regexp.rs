use async_trait::async_trait;
use famulus_core::action::FilterRegexpParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem, TemplateEngine};
use regex::Regex;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Drops or keeps items by matching a regular expression against a
/// templated input value.
///
/// A non-templated expression is compiled once at definition load time, so
/// a broken pattern is rejected before the job ever runs. Templated
/// expressions can only be checked per item.
pub struct FilterRegexpAction {
    params: FilterRegexpParams,
    compiled: Option<Regex>,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::FilterRegexp(params) => {
            let compiled = if TemplateEngine::is_template(&params.expression) {
                None
            } else {
                let regex = Regex::new(&params.expression).map_err(|e| {
                    ConfigError::InvalidParameter(format!(
                        "invalid expression '{}': {e}",
                        params.expression
                    ))
                })?;
                Some(regex)
            };
            Ok(Box::new(FilterRegexpAction {
                params: params.clone(),
                compiled,
            }))
        }
        _ => Err(super::mismatch(spec, "filterRegexp")),
    }
}

#[async_trait]
impl Action for FilterRegexpAction {
    fn kind(&self) -> &'static str {
        "filterRegexp"
    }

    async fn process(
        &self,
        item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let input = ctx.render(&self.params.input, &item)?;
        let matched = match &self.compiled {
            Some(regex) => regex.is_match(&input),
            None => {
                let expression = ctx.render(&self.params.expression, &item)?;
                let regex = Regex::new(&expression).map_err(|e| {
                    ActionError::Logic(format!("invalid expression '{expression}': {e}"))
                })?;
                regex.is_match(&input)
            }
        };

        if matched != self.params.drop_matching {
            Ok(vec![item])
        } else {
            Ok(Vec::new())
        }
    }
}
