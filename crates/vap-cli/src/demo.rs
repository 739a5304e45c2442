//! Demo skill answering from the `[responses]` table of the config

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;
use vap_core::Capability;
use vap_skill::{InboundRequest, SkillHandler};

/// Answers intents it has a canned response for. `{slot}` placeholders in
/// a response are replaced with the request's slot values.
pub struct DemoSkill {
    responses: HashMap<String, String>,
}

impl DemoSkill {
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self { responses }
    }

    fn response_for(&self, request: &InboundRequest) -> Option<&str> {
        request
            .intent
            .as_deref()
            .and_then(|intent| self.responses.get(intent))
            .map(String::as_str)
    }
}

#[async_trait]
impl SkillHandler for DemoSkill {
    async fn can_you_answer(&self, request: &InboundRequest) -> f32 {
        if self.response_for(request).is_some() {
            1.0
        } else {
            0.0
        }
    }

    async fn request(&self, request: &InboundRequest) -> Vec<Capability> {
        let Some(template) = self.response_for(request) else {
            debug!("No response for intent {:?}", request.intent);
            return Vec::new();
        };
        vec![Capability::text(&fill_slots(template, request))]
    }
}

fn fill_slots(template: &str, request: &InboundRequest) -> String {
    request.slots.iter().fold(template.to_string(), |text, slot| {
        match &slot.value {
            Some(value) => text.replace(&format!("{{{}}}", slot.name), value),
            None => text,
        }
    })
}
