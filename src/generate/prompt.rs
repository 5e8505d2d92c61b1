//! Prompt compiler: turns a site brief into the model instructions.

pub const PROJECT_SYSTEM_PROMPT: &str = "You generate Vite React + Tailwind project source files.";

pub const REPAIR_SYSTEM_PROMPT: &str = "You fix malformed JSON.
Return ONLY valid JSON, no markdown, no commentary.
Preserve the original meaning and content as much as possible.";

const PROJECT_INSTRUCTIONS: &[&str] = &[
    "You are a frontend agent building a Vite + React + Tailwind site.",
    "Return ONLY valid JSON, no markdown fences or extra text.",
    r#"JSON shape: {"siteTitle":"...","files":[{"path":"src/App.jsx","content":"..."}]}"#,
    "Only include files under src/ or public/.",
    "Always include src/App.jsx and src/index.css.",
    "Use Tailwind utility classes for styling.",
    "Do not include package.json, config files, or build output.",
    "Inline small assets (SVG icons, gradients) instead of referencing external files.",
    "Build a long-scroll landing page with sections: hero, benefits, features, testimonials, pricing, FAQ, call to action, and footer.",
    "Prefer keeping everything in src/App.jsx.",
];

/// The user message for the project generation call.
pub fn build_project_prompt(brief: &str) -> String {
    let mut prompt = PROJECT_INSTRUCTIONS.join("\n");
    prompt.push_str("\n\nSite brief: ");
    prompt.push_str(brief);
    prompt
}

/// The user message for the JSON repair call. `clipped` is already cut to
/// the configured maximum.
pub fn build_repair_prompt(clipped: &str) -> String {
    format!("Fix this JSON:\n{}", clipped)
}
