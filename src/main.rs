use anyhow::{ensure, Context, Result};

use lane_seg_rs::{logging, Config, MaskLoader};

fn main() -> Result<()> {
    let config = Config::new();
    let _log_handle = log4rs::init_config(logging::build_log_config(
        config.log_level,
        config.log_dir.as_deref(),
    )?)?;

    ensure!(
        config.dataset_dir.is_dir(),
        "Dataset directory does not exist: {}",
        config.dataset_dir.display()
    );

    let dataset_config = config.dataset_config()?;
    let loader = MaskLoader::new(dataset_config)?.with_progress_bar(config.progress);
    let mut catalog = loader
        .load(&config.dataset_dir, &config.split)
        .with_context(|| format!("Failed to load split `{}`", config.split))?;

    let mut areas = vec![0usize; catalog.num_classes()];
    for index in 0..catalog.len() {
        let id = catalog.entry(index)?.id.clone();
        let (mask, _) = catalog.get_mask(index)?;

        for (class_id, area) in areas.iter_mut().enumerate().skip(1) {
            *area += mask.class_area(class_id);
        }
        if let Some(dir) = &config.export_masks {
            mask.save_planes(dir, &id)
                .with_context(|| format!("Failed to export masks of {id}"))?;
        }
    }

    log::info!("split `{}`: {} images", catalog.split(), catalog.len());
    for class_id in catalog.class_ids() {
        let class_id = usize::from(class_id);
        log::info!(
            "  class {class_id} ({}): {} pixels",
            catalog.class_name(class_id).unwrap_or("?"),
            areas[class_id]
        );
    }
    if let Some(dir) = &config.export_masks {
        log::info!("masks written to {}", dir.display());
    }

    Ok(())
}
