/// Cosmetic spellings the market uses interchangeably, mapped to the one it
/// actually accepts in lookups.
const NAME_REWRITES: &[(&str, &str)] = &[("(Holo/Foil)", "(Holo-Foil)")];

pub fn normalize_name(name: &str) -> String {
    NAME_REWRITES
        .iter()
        .fold(name.to_owned(), |acc, (from, to)| acc.replace(from, to))
}

/// Derives the lookup key for an item.
///
/// A wear qualified item is keyed as `"<name> (<wear>)"`, unless only the bare
/// name is known, which happens when an earlier fetch had no wear data for it.
/// `is_known` tells whether a key already has a cached price.
pub fn canonical_key(name: &str, wear_variant: Option<&str>, is_known: impl Fn(&str) -> bool) -> String {
    let base = normalize_name(name);

    let Some(wear) = wear_variant else {
        return base;
    };

    let qualified = format!("{} ({})", base, wear);
    if !is_known(&qualified) && is_known(&base) {
        return base;
    }

    qualified
}
