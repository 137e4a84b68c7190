//! Outbound messages
//!
//! What a turn hands back to the channel renderer: plain text, button
//! choices and provider card lists.

use serde::{Deserialize, Serialize};

use crate::models::{Provider, DEFAULT_PROVIDER_IMAGE};

pub const SHOW_OTHER_LOCATIONS: &str = "/show_other_locations";
pub const CANCEL_REQUEST: &str = "/cancel_request";
pub const CONFIRM_BOOKING: &str = "/confirm_booking";
pub const CANCEL_BOOKING: &str = "/cancel_booking";
pub const NOTIFY_WHEN_AVAILABLE: &str = "/notify_when_available";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub title: String,
    pub payload: String,
}

impl Button {
    pub fn new(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            payload: payload.into(),
        }
    }
}

/// One provider as rendered in a card list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCard {
    pub name: String,
    pub rating: f64,
    pub expertise: Vec<String>,
    pub image_url: String,
    pub id: String,
    pub city: String,
}

impl From<&Provider> for ProviderCard {
    fn from(p: &Provider) -> Self {
        Self {
            name: p.name.clone(),
            rating: p.rating,
            expertise: p.expertise.clone(),
            image_url: p
                .profile_image
                .clone()
                .unwrap_or_else(|| DEFAULT_PROVIDER_IMAGE.to_string()),
            id: p.id.clone(),
            city: p
                .city
                .clone()
                .unwrap_or_else(|| "Unknown location".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotMessage {
    Text {
        text: String,
    },
    Buttons {
        text: String,
        buttons: Vec<Button>,
    },
    ProviderList {
        cards: Vec<ProviderCard>,
        problem_type: String,
    },
}

impl BotMessage {
    pub fn text(&self) -> Option<&str> {
        match self {
            BotMessage::Text { text } | BotMessage::Buttons { text, .. } => Some(text),
            BotMessage::ProviderList { .. } => None,
        }
    }
}

/// Messages collected over one turn, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub messages: Vec<BotMessage>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.messages.push(BotMessage::Text { text: text.into() });
        self
    }

    pub fn buttons(&mut self, text: impl Into<String>, buttons: Vec<Button>) -> &mut Self {
        self.messages.push(BotMessage::Buttons {
            text: text.into(),
            buttons,
        });
        self
    }

    pub fn providers<'a>(
        &mut self,
        providers: impl IntoIterator<Item = &'a Provider>,
        problem_type: impl Into<String>,
    ) -> &mut Self {
        self.messages.push(BotMessage::ProviderList {
            cards: providers.into_iter().map(ProviderCard::from).collect(),
            problem_type: problem_type.into(),
        });
        self
    }

    pub fn single(text: impl Into<String>) -> Self {
        let mut reply = Self::new();
        reply.text(text);
        reply
    }

    /// All text bodies joined by newlines.
    pub fn joined_text(&self) -> String {
        self.messages
            .iter()
            .filter_map(BotMessage::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Button payloads across every message.
    pub fn payloads(&self) -> Vec<&str> {
        self.messages
            .iter()
            .flat_map(|m| match m {
                BotMessage::Buttons { buttons, .. } => buttons.iter().map(|b| b.payload.as_str()).collect(),
                _ => Vec::new(),
            })
            .collect()
    }

    pub fn cards(&self) -> Vec<&ProviderCard> {
        self.messages
            .iter()
            .flat_map(|m| match m {
                BotMessage::ProviderList { cards, .. } => cards.iter().collect(),
                _ => Vec::new(),
            })
            .collect()
    }
}
