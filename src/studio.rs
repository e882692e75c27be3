use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::Database;
use crate::error::{Result, TrackerError};
use crate::interfaces::providers::LlmProvider;
use crate::scripts::template::render;
use crate::scripts::{ContentType, ScriptCorrection, ScriptFamily, ScriptStore};
use crate::videos::VideoStore;

const MAX_CORRECTIONS: usize = 5;

const SYSTEM_PROMPT: &str =
    "You write YouTube content for a single creator. Follow their guide and voice exactly.";

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub content_type: ContentType,
    pub topic: Option<String>,
    pub notes: Option<String>,
    pub video_id: Option<i32>,
    pub profile_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub output: String,
    pub prompt: String,
    pub history_id: i32,
    pub missing_tags: Vec<String>,
}

/// Built-in coordination template used until the user saves one.
pub fn default_template(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Script => {
            "{{guide}}\n\nCreator profile:\n{{profile}}\n\nPast corrections:\n{{corrections}}\n\n\
             Write a full video script about: {{topic}}\nVideo: {{video_title}}\n\
             {{video_description}}\nNotes: {{notes}}"
        }
        ContentType::Title => {
            "{{guide}}\n\nCreator profile:\n{{profile}}\n\nPast corrections:\n{{corrections}}\n\n\
             Suggest five titles for a video about: {{topic}}\nCurrent title: {{video_title}}\n\
             Notes: {{notes}}"
        }
        ContentType::Thumbnail => {
            "{{guide}}\n\nCreator profile:\n{{profile}}\n\nPast corrections:\n{{corrections}}\n\n\
             Describe three thumbnail concepts for: {{topic}}\nVideo: {{video_title}}\n\
             Notes: {{notes}}"
        }
        ContentType::Description => {
            "{{guide}}\n\nCreator profile:\n{{profile}}\n\nPast corrections:\n{{corrections}}\n\n\
             Write a video description for: {{topic}}\nVideo: {{video_title}}\n\
             Current description: {{video_description}}\nNotes: {{notes}}"
        }
    }
}

/// Formats corrections newest first as a numbered list.
pub fn format_corrections(corrections: &[ScriptCorrection]) -> String {
    corrections
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            let mut line = format!(
                "{}. Instead of \"{}\" write \"{}\"",
                idx + 1,
                c.original_text,
                c.corrected_text
            );
            if let Some(note) = c.note.as_deref().filter(|n| !n.is_empty()) {
                line.push_str(&format!(" ({note})"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ScriptStudio {
    scripts: ScriptStore,
    videos: VideoStore,
    llm: Arc<dyn LlmProvider>,
}

impl ScriptStudio {
    pub fn new(db: Database, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            scripts: ScriptStore::new(db.clone()),
            videos: VideoStore::new(db),
            llm,
        }
    }

    /// Renders the coordination template for the request without calling
    /// the model. Returns the prompt and the tags left unresolved.
    pub async fn build_prompt(
        &self,
        user_id: &str,
        request: &GenerationRequest,
    ) -> Result<(String, Vec<String>)> {
        let content_type = request.content_type;
        let template = self
            .scripts
            .active_script(user_id, ScriptFamily::Coordination, content_type)
            .await?
            .map(|script| script.content)
            .unwrap_or_else(|| default_template(content_type).to_string());

        let guide = self
            .scripts
            .active_script(user_id, ScriptFamily::Instruction, content_type)
            .await?
            .map(|script| script.content)
            .unwrap_or_default();

        let profile = match request.profile_id {
            Some(id) => self
                .scripts
                .get_profile(user_id, id)
                .await?
                .ok_or_else(|| TrackerError::NotFound(format!("profile {id}")))?
                .content,
            None => self
                .scripts
                .default_profile(user_id)
                .await?
                .map(|p| p.content)
                .unwrap_or_default(),
        };

        let corrections = self
            .scripts
            .list_corrections(user_id, Some(content_type), MAX_CORRECTIONS)
            .await?;

        let (video_title, video_description) = match request.video_id {
            Some(id) => {
                let video = self
                    .videos
                    .get_video(user_id, id)
                    .await?
                    .ok_or_else(|| TrackerError::NotFound(format!("video {id}")))?;
                (video.title, video.description.unwrap_or_default())
            }
            None => (String::new(), String::new()),
        };

        let mut values: HashMap<&str, String> = HashMap::new();
        values.insert("guide", guide);
        values.insert("profile", profile);
        values.insert("corrections", format_corrections(&corrections));
        values.insert("topic", request.topic.clone().unwrap_or_default());
        values.insert("notes", request.notes.clone().unwrap_or_default());
        values.insert("video_title", video_title);
        values.insert("video_description", video_description);
        values.insert("content_type", content_type.to_string());

        let rendered = render(&template, &values);
        Ok((rendered.text, rendered.missing))
    }

    pub async fn generate(
        &self,
        user_id: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        let (prompt, missing_tags) = self.build_prompt(user_id, request).await?;
        let output = self.llm.generate_text(&prompt, SYSTEM_PROMPT).await?;
        let entry = self
            .scripts
            .add_history(user_id, request.content_type, request.video_id, &prompt, &output)
            .await?;
        info!(
            user_id = %user_id,
            content_type = %request.content_type,
            history_id = entry.id,
            "generated content"
        );
        Ok(GenerationResult {
            output,
            prompt,
            history_id: entry.id,
            missing_tags,
        })
    }
}
