//! Rebuild rows and columns from positioned text.
//!
//! Fragments sharing a baseline form a line. Consecutive lines with enough
//! cells form a table run, and shorter lines tucked under a row are that
//! row's wrapped text. The run's header line fixes the column anchors.

use super::{layout::TextFragment, RawTable};
use crate::config::ExtractionConfig;
use std::collections::BTreeMap;
use tracing::debug;

/// Below this gap two merged fragments are glued without a space.
const CONTIGUOUS_GAP: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub x: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub y: f64,
    pub cells: Vec<Cell>,
}

impl Line {
    /// The line read left to right, cells separated by one space.
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Group fragments into lines, top of page first.
pub fn group_lines(fragments: &[TextFragment], cfg: &ExtractionConfig) -> Vec<Line> {
    let mut sorted: Vec<&TextFragment> = fragments.iter().collect();
    sorted.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut buckets: Vec<(f64, Vec<&TextFragment>)> = Vec::new();
    for frag in sorted {
        match buckets.last_mut() {
            Some((y, members)) if (*y - frag.y).abs() <= cfg.row_tolerance => members.push(frag),
            _ => buckets.push((frag.y, vec![frag])),
        }
    }

    buckets
        .into_iter()
        .map(|(y, mut members)| {
            members.sort_by(|a, b| a.x.total_cmp(&b.x));
            Line {
                y,
                cells: merge_cells(&members, cfg.merge_gap),
            }
        })
        .collect()
}

fn merge_cells(members: &[&TextFragment], merge_gap: f64) -> Vec<Cell> {
    let mut cells: Vec<Cell> = Vec::with_capacity(members.len());
    for frag in members {
        let text = collapse_ws(&frag.text);
        if text.is_empty() {
            continue;
        }
        match cells.last_mut() {
            Some(last) if frag.x - last.end <= merge_gap => {
                if frag.x - last.end > CONTIGUOUS_GAP {
                    last.text.push(' ');
                }
                last.text.push_str(&text);
                last.end = last.end.max(frag.end());
            }
            _ => cells.push(Cell {
                x: frag.x,
                end: frag.end(),
                text,
            }),
        }
    }
    cells
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A wide line and any wrapped lines printed just under it.
type RowGroup<'a> = Vec<&'a Line>;

/// Split lines into table runs and lay each run out on its header's columns.
pub fn detect_tables(lines: &[Line], page: u32, cfg: &ExtractionConfig) -> Vec<RawTable> {
    let mut tables = Vec::new();
    let mut run: Vec<RowGroup<'_>> = Vec::new();
    let mut pitch: Option<f64> = None;

    for line in lines {
        let wide = line.cells.len() >= cfg.min_columns;
        let gap = run
            .last()
            .and_then(|group| group.last())
            .map(|prev| prev.y - line.y);

        match (gap, pitch) {
            // closer than a row pitch: the cells above wrapped
            (Some(g), Some(p)) if !wide && g < p => {
                if let Some(group) = run.last_mut() {
                    group.push(line);
                }
                continue;
            }
            (Some(g), Some(p)) if g > p * cfg.table_gap_factor => {
                flush_run(&mut run, page, cfg, &mut tables);
                pitch = None;
            }
            _ if !wide => {
                flush_run(&mut run, page, cfg, &mut tables);
                pitch = None;
            }
            _ => {}
        }

        if wide {
            if pitch.is_none() {
                if let Some(prev) = run.last().and_then(|group| group.last()) {
                    pitch = Some(prev.y - line.y);
                }
            }
            run.push(vec![line]);
        }
    }
    flush_run(&mut run, page, cfg, &mut tables);
    tables
}

fn flush_run(
    run: &mut Vec<RowGroup<'_>>,
    page: u32,
    cfg: &ExtractionConfig,
    tables: &mut Vec<RawTable>,
) {
    let start = header_index(run);
    if run.len() >= start + 2 {
        if start > 0 {
            debug!(page, lines = start, "lines above the header left out of the table");
        }
        let rows = layout_rows(&run[start..], cfg.column_slack);
        tables.push(RawTable::from_rows(page, tables.len(), rows));
    }
    run.clear();
}

/// First line at least as wide as the run's most common width. Narrower
/// lines above it are banners. Two-line runs always start at their first line.
fn header_index(run: &[RowGroup<'_>]) -> usize {
    if run.len() < 3 {
        return 0;
    }
    let mut widths: BTreeMap<usize, usize> = BTreeMap::new();
    for group in run {
        *widths.entry(group[0].cells.len()).or_default() += 1;
    }
    let usual = widths
        .iter()
        .max_by_key(|&(width, seen)| (*seen, *width))
        .map_or(0, |(width, _)| *width);
    run.iter()
        .position(|group| group[0].cells.len() >= usual)
        .unwrap_or(0)
}

fn layout_rows(groups: &[RowGroup<'_>], slack: f64) -> Vec<Vec<String>> {
    let anchors: Vec<f64> = groups[0][0].cells.iter().map(|c| c.x).collect();
    groups
        .iter()
        .map(|group| {
            let mut row = vec![String::new(); anchors.len()];
            for cell in group.iter().flat_map(|line| &line.cells) {
                let col = anchors
                    .iter()
                    .rposition(|&a| a <= cell.x + slack)
                    .unwrap_or(0);
                let slot = &mut row[col];
                if !slot.is_empty() {
                    slot.push(' ');
                }
                slot.push_str(&cell.text);
            }
            row
        })
        .collect()
}
