//! Demo nation directory built from the `nations` config section.

use conquest_core::config::NationSeed;
use conquest_types::NationId;
use conquest_warfare::{NationProfile, StaticDirectory};

/// Register every seeded nation in a fresh directory.
///
/// Returns the directory and the generated IDs in seed order.
pub fn seed_directory(seeds: &[NationSeed]) -> (StaticDirectory, Vec<NationId>) {
    let directory = StaticDirectory::new();
    let ids = seeds
        .iter()
        .map(|seed| {
            let id = NationId::new();
            directory.add_nation(NationProfile {
                id,
                name: seed.name.clone(),
                power: seed.power,
                balance: seed.balance,
                leader: None,
                government: seed.government,
            });
            id
        })
        .collect();
    (directory, ids)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use conquest_types::GovernmentType;
    use conquest_warfare::NationDirectory;
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn seeds_every_nation() {
        let seeds = vec![
            NationSeed {
                name: "Avalon".to_owned(),
                power: Decimal::new(300, 0),
                balance: Decimal::new(1_000, 0),
                government: GovernmentType::Democracy,
            },
            NationSeed {
                name: "Vell".to_owned(),
                power: Decimal::new(150, 0),
                balance: Decimal::ZERO,
                government: GovernmentType::Tribal,
            },
        ];
        let (directory, ids) = seed_directory(&seeds);
        assert_eq!(ids.len(), 2);

        let avalon = directory.profile(*ids.first().unwrap()).unwrap();
        assert_eq!(avalon.name, "Avalon");
        assert_eq!(avalon.power, Decimal::new(300, 0));
        assert_eq!(avalon.government, GovernmentType::Democracy);
        assert_eq!(avalon.leader, None);
        assert_eq!(
            directory.balance(*ids.get(1).unwrap()),
            Some(Decimal::ZERO)
        );
    }
}
