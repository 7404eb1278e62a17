use crate::{CastingContext, Rule, VerdictResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialProfile {
    pub name: &'static str,
    /// mm
    pub min_wall_thickness: f64,
    /// degrees
    pub draft_angle: f64,
    /// percent
    pub shrinkage: f64,
    /// fillet radius as a fraction of wall thickness
    pub fillet_ratio: f64,
    pub guidance: &'static str,
}

pub const MATERIAL_PROFILES: [MaterialProfile; 4] = [
    MaterialProfile {
        name: "Gray Cast Iron",
        min_wall_thickness: 3.0,
        draft_angle: 1.5,
        shrinkage: 1.0,
        fillet_ratio: 0.25,
        guidance: "Focus on thick sections (>3mm), draft angles (1.5°), and feeding paths. \
Gray iron is forgiving but requires good feeding.",
    },
    MaterialProfile {
        name: "Aluminum A356",
        min_wall_thickness: 2.5,
        draft_angle: 1.0,
        shrinkage: 1.2,
        fillet_ratio: 0.2,
        guidance: "Check for thin walls (>2.5mm), sharp corners (add fillets), and gas porosity risks. \
Aluminum requires degassing considerations.",
    },
    MaterialProfile {
        name: "Bronze",
        min_wall_thickness: 2.0,
        draft_angle: 1.0,
        shrinkage: 1.5,
        fillet_ratio: 0.2,
        guidance: "Evaluate fine details and thin sections (>2mm). \
Bronze allows complex geometry but watch for shrinkage.",
    },
    MaterialProfile {
        name: "Steel",
        min_wall_thickness: 4.0,
        draft_angle: 2.0,
        shrinkage: 2.0,
        fillet_ratio: 0.3,
        guidance: "Assess heavy sections (>4mm), high shrinkage (2%), and feeding requirements. \
Steel needs robust feeding systems.",
    },
];

const GENERIC_GUIDANCE: &str = "Apply standard casting design principles.";

/// Exact (case-insensitive) lookup. Unknown materials return None.
pub fn find_material(material: &str) -> Option<&'static MaterialProfile> {
    MATERIAL_PROFILES
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(material.trim()))
}

/// Profile used for numeric recommendations; unknown materials fall back to
/// gray iron.
pub fn material_profile(material: &str) -> &'static MaterialProfile {
    find_material(material).unwrap_or(&MATERIAL_PROFILES[0])
}

pub fn material_guidance(material: &str) -> &'static str {
    find_material(material)
        .map(|p| p.guidance)
        .unwrap_or(GENERIC_GUIDANCE)
}

pub fn volume_guidance(volume: u64) -> String {
    format!(
        "Production volume: {} parts - consider appropriate casting process based on \
volume economics and part complexity.",
        format_volume(volume)
    )
}

/// `1234567` -> `1,234,567`
pub fn format_volume(volume: u64) -> String {
    let digits = volume.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Suggested fix for a rule the drawing failed. Empty for any other result.
pub fn recommended_action(rule: &Rule, result: VerdictResult, ctx: &CastingContext) -> String {
    if result != VerdictResult::NonCompliant {
        return String::new();
    }
    let p = material_profile(&ctx.material);
    let material = &ctx.material;
    let casting_type = &ctx.casting_type;
    let wall = p.min_wall_thickness;

    let category = rule.category.as_deref().unwrap_or("").to_lowercase();
    let base = match category.as_str() {
        "feeding" => format!(
            "Add feeding channels or redesign to eliminate isolated heavy sections. \
For {material}, ensure feeding paths are ≥{:.1}mm wide",
            wall * 1.5
        ),
        "directional solidification" => format!(
            "Redesign with progressive wall thickness increase toward risers and add {}° draft \
in the feeding direction. For {material}, maintain minimum {wall}mm walls",
            p.draft_angle
        ),
        "corners" => format!(
            "Add fillet radii (min R = {} × wall thickness = {:.1}mm) to internal corners for {material}",
            p.fillet_ratio,
            wall * p.fillet_ratio
        ),
        "junctions" => format!(
            "Redesign junction to have maximum 2 intersecting sections, staggering or coring \
unavoidable intersections. Critical for {casting_type}"
        ),
        "wall thickness" => format!(
            "Redesign for uniform wall thickness (variation <30%). Maintain {wall}mm minimum for {material}"
        ),
        "inner walls" => format!(
            "Reduce inner wall thickness to 90% of outer wall thickness for {material}, \
coring or venting enclosed heavy sections"
        ),
        "fillets" => format!(
            "Size fillets at R = {:.1}mm (max R = {:.1}mm) on re-entrant corners for {material}",
            wall * p.fillet_ratio,
            wall * 0.5
        ),
        "section transitions" => format!(
            "Eliminate step changes - use gradual tapered transitions between wall thicknesses for {casting_type}"
        ),
        "ribs" => format!(
            "Reduce rib thickness to 80% of adjoining wall thickness ({:.1}mm) and relieve rib \
intersections for {material}",
            wall * 0.8
        ),
        "bosses and pads" => format!(
            "Blend bosses smoothly into walls and connect isolated pads to the main structure; \
keep boss walls at {wall}mm for {material}"
        ),
        _ => format!("Review {} requirements for {material}", rule.id),
    };
    format!("{base}. Production volume: {} parts.", format_volume(ctx.volume))
}

/// Short material and volume tokens for report file names, e.g.
/// `("AluminumA356", "5K")`. Only ASCII alphanumerics, `-` and `_` survive.
pub fn filename_components(ctx: &CastingContext) -> (String, String) {
    let material: String = ctx
        .material
        .replace(' ', "")
        .replace("Cast", "")
        .replace("Iron", "Fe")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    let material = if material.is_empty() {
        "material".to_string()
    } else {
        material
    };
    let volume = if ctx.volume >= 1000 {
        format!("{}K", ctx.volume / 1000)
    } else {
        ctx.volume.to_string()
    };
    (material, volume)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(material: &str, volume: u64) -> CastingContext {
        CastingContext {
            casting_type: "Pump Housing".into(),
            material: material.into(),
            volume,
            process: "Sand Casting".into(),
            tolerance: "Standard".into(),
            surface_finish: "As-cast".into(),
        }
    }

    fn rule(category: &str) -> Rule {
        Rule {
            id: "R5".into(),
            checklist_item: "fillets".into(),
            category: Some(category.into()),
            severity: None,
        }
    }

    #[test]
    fn volume_grouping() {
        assert_eq!(format_volume(0), "0");
        assert_eq!(format_volume(999), "999");
        assert_eq!(format_volume(1000), "1,000");
        assert_eq!(format_volume(1234567), "1,234,567");
    }

    #[test]
    fn filename_components_match_naming_convention() {
        assert_eq!(
            filename_components(&ctx("Gray Cast Iron", 5000)),
            ("GrayFe".to_string(), "5K".to_string())
        );
        assert_eq!(
            filename_components(&ctx("Aluminum A356", 250)),
            ("AluminumA356".to_string(), "250".to_string())
        );
        assert_eq!(filename_components(&ctx("../..", 1)).0, "material");
    }

    #[test]
    fn unknown_material_gets_generic_guidance() {
        assert_eq!(material_guidance("Unobtainium"), GENERIC_GUIDANCE);
        assert!(material_guidance("steel").contains("4mm"));
        assert_eq!(material_profile("Unobtainium").name, "Gray Cast Iron");
    }

    #[test]
    fn recommended_action_only_for_non_compliant() {
        let c = ctx("Steel", 12000);
        assert!(recommended_action(&rule("Corners"), VerdictResult::Compliant, &c).is_empty());
        assert!(recommended_action(&rule("Corners"), VerdictResult::NeedsReview, &c).is_empty());
        let action = recommended_action(&rule("Corners"), VerdictResult::NonCompliant, &c);
        assert!(action.contains("1.2mm"), "{action}");
        assert!(action.ends_with("Production volume: 12,000 parts."));
    }
}
