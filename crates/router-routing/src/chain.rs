//! Fallback chain construction.

use router_core::{ModelCatalog, Tier, Vendor};

/// One candidate dispatch: a vendor and the model name it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Vendor to dispatch to.
    pub vendor: Vendor,
    /// Vendor-side model name.
    pub model: String,
    /// Tier of the equivalence class, absent for best-effort raw routing.
    pub tier: Option<Tier>,
}

/// Build the ordered candidate list for a requested model.
///
/// Walks the configured vendor priority keeping vendors that have a
/// registered adapter and an equivalent model in the requested model's
/// equivalence class. A name the catalog does not know still routes best
/// effort: a single candidate on the first registered vendor, dialing the
/// raw requested name.
#[must_use]
pub fn build_fallback_chain(
    catalog: &ModelCatalog,
    priority: &[Vendor],
    registered: &[Vendor],
    requested_model: &str,
) -> Vec<Candidate> {
    match catalog.find_mapping(requested_model) {
        Some(mapping) => priority
            .iter()
            .copied()
            .filter(|vendor| registered.contains(vendor))
            .filter_map(|vendor| {
                mapping.name_for(vendor).map(|model| Candidate {
                    vendor,
                    model: model.to_string(),
                    tier: Some(mapping.tier),
                })
            })
            .collect(),
        None => priority
            .iter()
            .copied()
            .find(|vendor| registered.contains(vendor))
            .map(|vendor| Candidate {
                vendor,
                model: requested_model.to_string(),
                tier: None,
            })
            .into_iter()
            .collect(),
    }
}
