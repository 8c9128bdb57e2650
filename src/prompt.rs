//! Prompt text sent to the generative backends.

const ILLUSTRATION_STYLE: &str = "Style: warm, colorful children's picture-book illustration. \
Clear subject, natural habitat, soft lighting, detailed but uncluttered. \
No text, letters or watermarks.";

const STORY_SYSTEM: &str = "You write short scene-by-scene nature stories for children about an \
animal's life. Each scene is educational and gentle, focused on the animal's natural behaviour, \
habitat and life cycle. You always answer with a single JSON object.";

/// Deterministic style wrapper around a scene's image description.
pub fn illustration_prompt(description: &str) -> String {
    format!(
        "Illustrate this scene:\n{}\n\n{}",
        description.trim(),
        ILLUSTRATION_STYLE
    )
}

pub fn story_system_prompt() -> &'static str {
    STORY_SYSTEM
}

pub fn story_user_prompt(subject: &str, scene_count: u32) -> String {
    format!(
        "Write a story about a {subject}'s life in {scene_count} scenes.\n\
Return JSON with exactly this shape:\n\
{{\n  \"story_title\": \"Title of the story\",\n  \"total_duration\": 25,\n  \"scenes\": [\n    {{\n      \"scene_number\": 1,\n      \"narration\": \"Narration spoken over this scene\",\n      \"image_prompt\": \"Detailed description of the picture for this scene\",\n      \"duration\": 5,\n      \"background_music\": \"nature_sounds_gentle\"\n    }}\n  ]\n}}",
        subject = subject.trim(),
        scene_count = scene_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illustration_prompt_is_deterministic() {
        let a = illustration_prompt("  a fox cub in the snow ");
        assert_eq!(a, illustration_prompt("a fox cub in the snow"));
        assert!(a.starts_with("Illustrate this scene:\na fox cub in the snow\n"));
        assert!(a.ends_with(ILLUSTRATION_STYLE));
    }

    #[test]
    fn story_prompt_names_subject_and_schema() {
        let p = story_user_prompt("Lion", 10);
        assert!(p.contains("a Lion's life in 10 scenes"));
        for key in ["story_title", "scenes", "narration", "image_prompt", "scene_number"] {
            assert!(p.contains(key), "missing {key}");
        }
    }
}
