//! Entities command - registry table

use crate::domain::entity::EntityKind;

pub fn run() -> anyhow::Result<()> {
    println!("{:<14} {:<16} {:<10} {:>8}", "ENTITY", "PATH", "TIER", "TTL(s)");

    for kind in EntityKind::ALL {
        let tier = kind.ttl_tier();
        println!(
            "{:<14} {:<16} {:<10} {:>8}",
            kind.namespace(),
            kind.path(),
            format!("{:?}", tier),
            tier.duration().as_secs()
        );
    }

    Ok(())
}
