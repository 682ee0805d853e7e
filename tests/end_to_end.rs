use molcache::{BlockRegistry, BlockSelection, DatasetConfig, DescriptorDataset, Molecule};

/// Three molecules, one block of width 4, one molecule without a label.
#[test]
fn three_molecule_scenario() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();

    let mut registry = BlockRegistry::new();
    registry
        .register_fn("Counts", 4, |m: &Molecule| {
            let smiles = match m.property("smiles") {
                Some(molcache::PropertyValue::String(s)) => s.clone(),
                _ => anyhow::bail!("molecule {} has no smiles", m.id),
            };
            let count = |c: char| smiles.chars().filter(|x| *x == c).count() as f32;
            Ok(vec![count('C'), count('O'), count('N'), smiles.len() as f32])
        })
        .unwrap();

    let molecules = vec![
        Molecule::new("ethanol").with_property("smiles", "CCO").with_property("dG", -5.0),
        Molecule::new("methylamine").with_property("smiles", "CN").with_property("dG", -4.5),
        Molecule::new("propanol").with_property("smiles", "CCCO"),
    ];

    let config = DatasetConfig {
        verbose: true,
        ..DatasetConfig::new(BlockSelection::all(1), dir.path())
    };
    let mut ds = DescriptorDataset::new(molecules, registry, config).unwrap();
    assert_eq!(ds.len(), 3);

    let raw: Vec<_> = (0..3).map(|i| ds.get_item(i).unwrap()).collect();
    for sample in &raw {
        assert_eq!(sample.features.len(), 4);
        assert_eq!(sample.label.len(), 1);
    }
    assert_eq!(raw[0].features, vec![2.0, 1.0, 0.0, 3.0]);
    assert_eq!(raw[0].label, vec![-5.0]);
    assert!(raw[2].label[0].is_nan());

    let stats = ds.find_normalization_factors().unwrap().clone();
    assert_eq!(stats.mu.len(), 4);
    assert_eq!(stats.width.len(), 4);
    assert!(ds.is_materialized());
    assert!(ds
        .cache_folder()
        .join("normalization_factors_no_filter.dat")
        .is_file());

    for (i, r) in raw.iter().enumerate() {
        let normalized = ds.get_item(i).unwrap();
        let expected: Vec<f32> = r
            .features
            .iter()
            .zip(stats.mu.iter().zip(&stats.width))
            .map(|(x, (mu, w))| (x - mu) / w)
            .collect();
        assert_eq!(normalized.features, expected);
        assert!(normalized.bit_eq(&molcache::Sample {
            features: expected,
            label: r.label.clone(),
        }));
    }

    let ranges = ds.find_ranges().unwrap();
    assert_eq!(ranges.len(), 4);
    assert!(ranges.iter().all(|(lo, hi)| lo <= hi));

    assert!(ds.get_item(3).is_err());
}

#[test]
fn config_round_trips_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.json");
    let cfg = DatasetConfig {
        normalize: true,
        use_block_cache: true,
        ..DatasetConfig::new(vec![true, false, true], dir.path()).with_budget_mb(64)
    };
    std::fs::write(&path, serde_json::to_string_pretty(&cfg).unwrap()).unwrap();
    assert_eq!(DatasetConfig::from_json_file(&path).unwrap(), cfg);
}
