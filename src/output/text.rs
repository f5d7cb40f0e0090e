//! Human-readable output for resolved analyses and cache statistics.
//!
//! Colors come from `yansi` and are dropped when the caller disables them
//! globally (`--no-color` or `NO_COLOR`).

use std::io::{self, Write};

use yansi::Paint;

use crate::cache::LocalTierStats;
use crate::coordinator::{PurgeSummary, Resolution};
use crate::record::DietaryFlags;

/// Plain-text rendering of a [`Resolution`].
#[derive(Debug)]
pub struct TextOutput<'a> {
    resolution: &'a Resolution,
}

impl<'a> TextOutput<'a> {
    #[must_use]
    pub fn new(resolution: &'a Resolution) -> Self {
        Self { resolution }
    }

    /// Write the summary to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let record = &self.resolution.record;
        writeln!(
            w,
            "{} {}",
            record.subject_name.as_str().bold(),
            format!("({})", record.category).dim()
        )?;
        writeln!(
            w,
            "{} {}",
            "source:".dim(),
            self.resolution.origin.to_string().cyan()
        )?;
        writeln!(w)?;

        let n = &record.nutrition;
        writeln!(
            w,
            "{:.0} kcal | protein {:.1} g | carbs {:.1} g | fat {:.1} g",
            n.calories, n.protein_g, n.carbs_g, n.fat_g
        )?;
        let tags = flag_names(&record.dietary_flags);
        if !tags.is_empty() {
            writeln!(w, "{} {}", "tags:".dim(), tags.join(", "))?;
        }
        writeln!(
            w,
            "{} {:.0}/100",
            "health:".dim(),
            record.health_score.overall
        )?;

        let compliance = &record.compliance;
        if !compliance.permitted {
            writeln!(w, "{}", "Not permitted".red().bold())?;
        }
        if let Some(note) = &compliance.note {
            writeln!(w, "{} {}", "note:".dim(), note)?;
        }
        if !compliance.allergens.is_empty() {
            let allergens: Vec<&str> = compliance.allergens.iter().map(String::as_str).collect();
            writeln!(w, "{} {}", "allergens:".yellow(), allergens.join(", "))?;
        }

        writeln!(w)?;
        writeln!(w, "{}", "Ingredients".bold())?;
        for item in &record.ingredients {
            writeln!(w, "  - {}", item)?;
        }

        let prep = &record.preparation;
        writeln!(w)?;
        writeln!(
            w,
            "{} ({} servings, {} min prep, {} min cook)",
            "Preparation".bold(),
            prep.servings,
            prep.prep_minutes,
            prep.cook_minutes
        )?;
        for (i, step) in prep.steps.iter().enumerate() {
            writeln!(w, "  {}. {}", i + 1, step)?;
        }
        Ok(())
    }
}

fn flag_names(flags: &DietaryFlags) -> Vec<&'static str> {
    [
        (flags.high_protein, "high-protein"),
        (flags.contains_gluten, "gluten"),
        (flags.contains_dairy, "dairy"),
        (flags.vegan, "vegan"),
        (flags.keto, "keto"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect()
}

/// Write a purge summary.
pub fn write_purge<W: Write>(w: &mut W, summary: &PurgeSummary) -> io::Result<()> {
    writeln!(
        w,
        "Removed {} cached analyses ({} local, {} persistent)",
        summary.total().bold(),
        summary.local,
        summary.persistent
    )
}

/// Write cache statistics.
pub fn write_stats<W: Write>(
    w: &mut W,
    local: &LocalTierStats,
    persistent_rows: usize,
) -> io::Result<()> {
    writeln!(w, "{}", "Local tier".bold())?;
    writeln!(w, "  entries:      {}/{}", local.entries, local.capacity)?;
    writeln!(w, "  fingerprints: {}", local.fingerprinted)?;
    if let Some(oldest) = local.oldest {
        writeln!(w, "  oldest:       {}", oldest.format("%Y-%m-%d %H:%M UTC"))?;
    }
    if let Some(cleanup) = local.last_cleanup {
        writeln!(w, "  last cleanup: {}", cleanup.format("%Y-%m-%d %H:%M UTC"))?;
    }
    writeln!(w, "{}", "Persistent tier".bold())?;
    writeln!(w, "  rows:         {}", persistent_rows)
}
