// SPDX-License-Identifier: Apache-2.0

//! Safety Interceptor
//!
//! Rejects queries matching configured patterns before they reach the
//! server. Rules come from connection properties:
//!
//! ```text
//! safety.rule.no-drop   = ^\s*DROP\s
//! safety.rule.no-grant  = ^\s*GRANT\s
//! safety.topLevelOnly   = true
//! ```
//!
//! Patterns are case-insensitive regular expressions matched against the SQL.

use regex::{Regex, RegexBuilder};

use crate::config::Properties;
use crate::engine::connection::ConnectionHandle;
use crate::engine::types::{Query, ResultSet};
use crate::interceptor::error::InterceptorError;
use crate::interceptor::log::LogSink;
use crate::interceptor::traits::QueryInterceptor;

pub const RULE_PREFIX: &str = "safety.rule.";
pub const TOP_LEVEL_ONLY_PROPERTY: &str = "safety.topLevelOnly";

#[derive(Debug, Clone)]
struct SafetyRule {
    name: String,
    pattern: Regex,
}

/// Blocks queries matching any configured rule
#[derive(Debug)]
pub struct SafetyInterceptor {
    rules: Vec<SafetyRule>,
    top_level_only: bool,
    log: Option<LogSink>,
}

impl SafetyInterceptor {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            top_level_only: true,
            log: None,
        }
    }

    /// Names of the loaded rules, in evaluation order (sorted by property key)
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    fn load_rules(&mut self, props: &Properties) -> Result<(), InterceptorError> {
        for (name, pattern) in props.with_prefix(RULE_PREFIX) {
            let pattern = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    InterceptorError::invalid_property(format!("{}{}", RULE_PREFIX, name), e.to_string())
                })?;
            self.rules.push(SafetyRule {
                name: name.to_string(),
                pattern,
            });
        }
        Ok(())
    }

    fn check(&self, sql: &str) -> Result<(), InterceptorError> {
        match self.rules.iter().find(|rule| rule.pattern.is_match(sql)) {
            Some(rule) => {
                if let Some(log) = &self.log {
                    log.warn(format_args!("query blocked by safety rule '{}'", rule.name));
                }
                Err(InterceptorError::rejected(
                    rule.name.clone(),
                    format!("query matches pattern '{}'", rule.pattern.as_str()),
                ))
            }
            None => Ok(()),
        }
    }
}

impl Default for SafetyInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryInterceptor for SafetyInterceptor {
    fn init(
        mut self: Box<Self>,
        _conn: &ConnectionHandle,
        props: &Properties,
        log: &LogSink,
    ) -> Result<Box<dyn QueryInterceptor>, InterceptorError> {
        self.load_rules(props)?;
        self.top_level_only = props.get_bool(TOP_LEVEL_ONLY_PROPERTY, true)?;

        log.debug(format_args!(
            "loaded {} safety rule(s): {}",
            self.rules.len(),
            self.rule_names().join(", ")
        ));
        self.log = Some(log.clone());
        Ok(self)
    }

    fn pre_process(&self, sql: &str, _query: &Query) -> Result<Option<ResultSet>, InterceptorError> {
        self.check(sql)?;
        Ok(None)
    }

    fn execute_top_level_only(&self) -> bool {
        self.top_level_only
    }
}
