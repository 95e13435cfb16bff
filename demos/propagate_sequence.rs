// Example: build a small project, annotate frame 0 and walk it forward

use box_annotation::{
    BoxGeometry, ClassCatalog, PropagationPolicy, Result, SequenceManager, SessionOptions,
    TrackAssignment,
};
use tracing::{info, Level};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    let root = std::env::args()
        .nth(1)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("box-annotation-demo"));

    SequenceManager::create_frame_structure(&root, 5)?;

    let options = SessionOptions {
        propagation: PropagationPolicy::AutoOnEmpty,
        ..Default::default()
    };
    let mut sequence = SequenceManager::new(options);
    sequence.open_sequence(&root)?;

    let catalog = ClassCatalog::default();
    for (class, x) in catalog.classes().iter().zip([0.0, 5.0, 10.0]) {
        let geometry = BoxGeometry::new([x, 0.0, 0.0], [2.0, 1.0, 1.5], [0.0, 0.0, 0.0])?;
        let record = sequence.create_annotation(class, geometry, TrackAssignment::New)?;
        info!("Created {} ({})", record.id, record.class_label);
    }

    loop {
        let outcome = sequence.next()?;
        if !outcome.moved {
            break;
        }
        if let Some(report) = &outcome.propagation {
            info!(
                "Frame {}: {} copied, {} skipped",
                outcome.frame_id,
                report.copied_count(),
                report.skipped_count()
            );
        }
    }
    sequence.close()?;

    info!("Project written to {}", root.display());
    Ok(())
}
