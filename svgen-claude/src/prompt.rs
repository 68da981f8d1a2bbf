/// Instructions sent as the system prompt on every request.
pub const SYSTEM_PROMPT: &str = "You are an expert SVG creator. The user will ask you to create or modify SVG images.

IMPORTANT INSTRUCTIONS:
1. Respond ONLY with valid SVG code
2. Do NOT include any explanations, comments, or markdown
3. Your response must start with <svg and end with </svg>
4. Create clean, optimized SVG code
5. Do not include any text outside the SVG tags

If editing an existing SVG, maintain its structure while implementing the requested changes.";

pub const EXISTING_MARKUP_OPEN: &str = "<existing-svg>";
pub const EXISTING_MARKUP_CLOSE: &str = "</existing-svg>";

/// What the user asked for.
///
/// Existing markup only travels with [`SvgRequest::Edit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SvgRequest {
    Create {
        prompt: String,
    },
    Edit {
        prompt: String,
        existing_markup: String,
    },
}

impl SvgRequest {
    pub fn prompt(&self) -> &str {
        match self {
            Self::Create { prompt } | Self::Edit { prompt, .. } => prompt,
        }
    }

    pub fn existing_markup(&self) -> Option<&str> {
        match self {
            Self::Create { .. } => None,
            Self::Edit {
                existing_markup, ..
            } => Some(existing_markup),
        }
    }
}

/// Compose the user message for `request`.
///
/// Pure function of its input. Edit requests embed the existing markup
/// verbatim between [`EXISTING_MARKUP_OPEN`] and [`EXISTING_MARKUP_CLOSE`].
pub fn build_prompt(request: &SvgRequest) -> String {
    match request {
        SvgRequest::Create { prompt } => {
            format!(
                "Create an SVG image based on this description: {}",
                prompt.trim()
            )
        }
        SvgRequest::Edit {
            prompt,
            existing_markup,
        } => format!(
            "Here is an SVG file. {}\n\n{EXISTING_MARKUP_OPEN}\n{existing_markup}\n{EXISTING_MARKUP_CLOSE}",
            prompt.trim()
        ),
    }
}
