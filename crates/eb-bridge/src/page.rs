// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Page interpreter
//!
//! Classifies pages served by the experiment application and pulls out the
//! two pieces of structure the bridge cares about: the JSON state block and
//! the names of the form fields the participant has to fill in.
//!
//! Markup goes through an HTML5 parser, so unclosed tags, comments and
//! script bodies are handled the way a browser would handle them.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use url::Url;

use crate::config::PageMarkers;

static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("valid script selector"));

static CONTROL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("input, select, textarea").expect("valid form control selector")
});

const BUTTON_INPUT_TYPES: &[&str] = &["submit", "button", "reset", "image"];

/// What a fetched page asks of the participant.
#[derive(Debug, Clone, PartialEq)]
pub enum PageClassification {
    /// The page needs input for `fields`
    ActionPage { fields: Vec<String>, state: Value },
    /// The page only shows state and is clicked through
    InformationalPage { state: Value },
    /// The application is holding the participant until others arrive
    WaitBarrier,
    /// The participant has finished every app in the session
    TerminalPage,
    Unrecognized,
}

impl PageClassification {
    pub fn name(&self) -> &'static str {
        match self {
            PageClassification::ActionPage { .. } => "action",
            PageClassification::InformationalPage { .. } => "informational",
            PageClassification::WaitBarrier => "wait",
            PageClassification::TerminalPage => "terminal",
            PageClassification::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageInterpreter {
    markers: PageMarkers,
}

impl PageInterpreter {
    pub fn new(markers: PageMarkers) -> Self {
        Self { markers }
    }

    /// Classify the page reached at `url`.
    ///
    /// `wait_marker` tells whether the response carried the wait-page header;
    /// it takes precedence over anything in the body.
    pub fn classify(&self, url: &Url, wait_marker: bool, markup: &str) -> PageClassification {
        if wait_marker {
            return PageClassification::WaitBarrier;
        }
        if self.is_terminal_url(url) {
            return PageClassification::TerminalPage;
        }

        let document = Html::parse_document(markup);
        let state = match self.state_of(&document) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(%url, error = %err, "State block is not valid JSON");
                return PageClassification::Unrecognized;
            }
        };
        let fields = self.fields_of(&document);

        match (state, fields.is_empty()) {
            (Some(state), false) => PageClassification::ActionPage { fields, state },
            (Some(state), true) => PageClassification::InformationalPage { state },
            (None, _) => PageClassification::Unrecognized,
        }
    }

    pub fn is_terminal_url(&self, url: &Url) -> bool {
        url.as_str().contains(&self.markers.terminal_url_marker)
    }

    /// Parse the state block, if the page has one.
    pub fn extract_state(&self, markup: &str) -> Result<Option<Value>, serde_json::Error> {
        self.state_of(&Html::parse_document(markup))
    }

    /// Names of form controls nested under the field wrapper class, in
    /// document order without duplicates.
    pub fn extract_fields(&self, markup: &str) -> Vec<String> {
        self.fields_of(&Html::parse_document(markup))
    }

    fn state_of(&self, document: &Html) -> Result<Option<Value>, serde_json::Error> {
        let Some(block) = document
            .select(&SCRIPT_SELECTOR)
            .find(|script| script.value().id() == Some(self.markers.state_block_id.as_str()))
        else {
            return Ok(None);
        };

        let body: String = block.text().collect();
        let body = body.trim();
        if body.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(body).map(Some)
    }

    fn fields_of(&self, document: &Html) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for control in document.select(&CONTROL_SELECTOR) {
            if !self.is_wrapped(control) {
                continue;
            }
            if let Some(name) = control_name(control) {
                if !fields.iter().any(|field| field == name) {
                    fields.push(name.to_string());
                }
            }
        }
        fields
    }

    fn is_wrapped(&self, control: ElementRef<'_>) -> bool {
        let wrapper = self.markers.field_wrapper_class.as_str();
        control
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| ancestor.value().classes().any(|class| class == wrapper))
    }
}

fn control_name(control: ElementRef<'_>) -> Option<&str> {
    let element = control.value();
    if element.name() == "input" {
        let kind = element.attr("type").unwrap_or_default();
        if BUTTON_INPUT_TYPES.iter().any(|button| kind.eq_ignore_ascii_case(button)) {
            return None;
        }
    }
    element.attr("name").filter(|name| !name.is_empty())
}
