// ABOUTME: Orders containers so every dependency comes before its dependents.
// ABOUTME: Also orders containers by creation time for watchtower instance reaping.

use crate::container::Container;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SortError {
    #[error("circular reference to {0}")]
    CircularReference(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unseen,
    InProgress,
    Done,
}

struct Graph<'a> {
    names: Vec<&'a str>,
    edges: Vec<Vec<usize>>,
    state: Vec<Visit>,
    order: Vec<usize>,
}

impl Graph<'_> {
    /// Depth-first walk from `root` with an explicit stack of
    /// `(node, next edge)` frames, so chain length does not grow the call stack.
    fn visit(&mut self, root: usize) -> Result<(), SortError> {
        if self.state[root] != Visit::Unseen {
            return Ok(());
        }
        self.state[root] = Visit::InProgress;
        let mut stack = vec![(root, 0usize)];

        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            let Some(&dependency) = self.edges[node].get(next) else {
                self.state[node] = Visit::Done;
                self.order.push(node);
                stack.pop();
                continue;
            };
            frame.1 += 1;

            match self.state[dependency] {
                Visit::Done => {}
                Visit::InProgress => {
                    return Err(SortError::CircularReference(
                        self.names[dependency].to_string(),
                    ));
                }
                Visit::Unseen => {
                    self.state[dependency] = Visit::InProgress;
                    stack.push((dependency, 0));
                }
            }
        }
        Ok(())
    }
}

/// Topologically sorts containers by their links, leaves first.
///
/// Links to containers outside the list are ignored. Containers without
/// edges keep their input order.
pub fn sort_by_dependencies(containers: Vec<Container>) -> Result<Vec<Container>, SortError> {
    let order = {
        let names: Vec<&str> = containers.iter().map(Container::name).collect();
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(*name).or_insert(i);
        }

        let edges = containers
            .iter()
            .map(|c| {
                c.links()
                    .iter()
                    .filter_map(|link| index.get(link.as_str()).copied())
                    .collect()
            })
            .collect();

        let mut graph = Graph {
            state: vec![Visit::Unseen; names.len()],
            order: Vec::with_capacity(names.len()),
            names,
            edges,
        };
        for node in 0..graph.names.len() {
            graph.visit(node)?;
        }
        graph.order
    };

    let mut slots: Vec<Option<Container>> = containers.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

fn created_at(container: &Container, now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&container.details().created)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Sorts oldest first. Unparseable creation times count as now.
pub fn sort_by_created(containers: &mut [Container]) {
    let now = Utc::now();
    containers.sort_by_key(|c| created_at(c, now));
}
