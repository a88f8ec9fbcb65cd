use minijinja::{context, Environment};
use serde::Serialize;

use crate::error::{Error, ErrorDetails};

const COCKTAIL_PROMPT_NAME: &str = "cocktail_prompt";
const COCKTAIL_PROMPT: &str = include_str!("templates/cocktail_prompt.minijinja");

#[derive(Serialize)]
struct MoodGuidance {
    mood: &'static str,
    guidance: &'static str,
}

const MOOD_GUIDANCE: &[MoodGuidance] = &[
    MoodGuidance {
        mood: "Happy",
        guidance: "Bright, citrusy, effervescent cocktails",
    },
    MoodGuidance {
        mood: "Sad",
        guidance: "Comforting, warming, spirit-forward drinks",
    },
    MoodGuidance {
        mood: "Energetic",
        guidance: "Spicy, caffeinated, or stimulating cocktails",
    },
    MoodGuidance {
        mood: "Relaxed",
        guidance: "Smooth, mellow, easy-drinking cocktails",
    },
    MoodGuidance {
        mood: "Celebratory",
        guidance: "Sparkling, festive, elaborate cocktails",
    },
    MoodGuidance {
        mood: "Chill",
        guidance: "Refreshing, cooling, laid-back drinks",
    },
    MoodGuidance {
        mood: "Adventurous",
        guidance: "Bold, unusual, complex flavor profiles",
    },
    MoodGuidance {
        mood: "Professional",
        guidance: "Sophisticated, classic, refined cocktails",
    },
    MoodGuidance {
        mood: "After Dark",
        guidance: "Provocative, sensual, adult-themed cocktails with suggestive names",
    },
];

/// Compiled prompt templates for suggestion providers.
#[derive(Debug)]
pub struct PromptTemplates {
    env: Environment<'static>,
}

impl PromptTemplates {
    pub fn new() -> Result<Self, Error> {
        let mut env = Environment::new();
        env.add_template(COCKTAIL_PROMPT_NAME, COCKTAIL_PROMPT)
            .map_err(|e| {
                Error::new(ErrorDetails::Config {
                    message: format!("Failed to compile cocktail prompt template: {e}"),
                })
            })?;
        Ok(Self { env })
    }

    pub fn render_cocktail_prompt(&self, mood: &str, liquor: &str) -> Result<String, Error> {
        let template = self.env.get_template(COCKTAIL_PROMPT_NAME).map_err(|e| {
            Error::new(ErrorDetails::InternalError {
                message: format!("Cocktail prompt template missing: {e}"),
            })
        })?;
        template
            .render(context! {
                mood => mood,
                liquor => liquor,
                mood_guidance => MOOD_GUIDANCE,
            })
            .map_err(|e| {
                Error::new(ErrorDetails::InternalError {
                    message: format!("Failed to render cocktail prompt: {e}"),
                })
            })
    }
}
