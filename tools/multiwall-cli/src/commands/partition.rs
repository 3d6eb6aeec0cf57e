//! Show how instances split into grid sections.

use multiwall_layout_engine::grid;

pub fn run(total: usize, sections: usize) -> anyhow::Result<()> {
    let ranges = grid::partition(total, sections)?;
    let widest = grid::max_items_per_section(total, sections)?;

    println!("{total} instances in {sections} sections (max {widest} per section):");
    for (section, range) in ranges.iter().enumerate() {
        if range.is_empty() {
            println!("  section {section}: empty");
        } else {
            println!(
                "  section {section}: positions {}..{} ({} instances)",
                range.start,
                range.end,
                range.len()
            );
        }
    }
    Ok(())
}
