use vidparse::matcher::{signature_order, SIGNATURES};

/// Print each platform with the hosts it claims, in matching order.
pub fn cmd_platforms() {
    for platform in signature_order() {
        let kinds: Vec<&str> = SIGNATURES
            .iter()
            .filter(|sig| sig.platform == platform)
            .map(|sig| if sig.short_link { "short link" } else { "canonical" })
            .collect();
        println!(
            "{:<10} {:<12} {}",
            platform.as_str(),
            platform.display_name(),
            kinds.join(", ")
        );
    }
}
