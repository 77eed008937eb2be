//! Templates command: list available extraction templates.

use crate::cli::Output;
use crate::config::{Settings, TemplateLibrary};
use crate::error::Result;

/// List all templates the current configuration knows about.
pub fn run_templates(settings: Settings) -> Result<()> {
    let library = TemplateLibrary::load(settings.extraction.custom_template_dir.as_deref())?;

    Output::header("Extraction templates");
    for name in library.names() {
        let Some(template) = library.get(&name) else {
            continue;
        };
        let category = template
            .category
            .as_deref()
            .map(|c| format!(", category: {}", c))
            .unwrap_or_default();
        Output::list_item(&format!(
            "{} (fields: {}, cost tier: {}{})",
            template.name,
            template.required_fields.join(", "),
            template.cost_tier,
            category,
        ));
    }

    Output::info(&format!(
        "Defaults: {}",
        settings.extraction.default_templates.join(", ")
    ));

    Ok(())
}
