//! Line-based text format for graphs.
//!
//! ```text
//! graph block0
//! # comments start with '#'
//! node conv Conv2D dtype=f16 format=nc1hwc0 shape=1,4,56,56,16
//! node relu Relu exec_unit=vector categories=elemwise
//! edge conv -> relu          # conv:0 -> first free input slot of relu
//! edge conv:1 -> relu:2
//! ctrl conv -> relu
//! ```
//!
//! `dtype`, `format` and `shape` describe output slot 0; `outN=dtype:format:dims`
//! describes any slot. `categories=a,b` overrides the category lookup and
//! `group.<family>=N` restores a group id. Other keys become attributes:
//! `true`/`false` read as booleans, integers as integers, comma lists as
//! string lists, anything else as a string.

use crate::graph::{Graph, NodeHandle};
use crate::types::{AttrValue, DataType, Format, GroupId, TensorDesc};
use crate::{CATEGORY_OVERRIDE_ATTR, GraphError};

/// Errors from [`parse_graph`], tagged with the 1-based line number.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: unknown directive '{directive}'")]
    UnknownDirective { line: usize, directive: String },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: unknown node '{name}'")]
    UnknownNode { line: usize, name: String },
    #[error("line {line}: {source}")]
    Graph {
        line: usize,
        #[source]
        source: GraphError,
    },
}

/// Parses a graph from its text form.
pub fn parse_graph(source: &str) -> Result<Graph, ParseError> {
    let mut graph = Graph::new("graph");

    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        let mut words = text.split_whitespace();
        let Some(directive) = words.next() else {
            continue;
        };
        let rest: Vec<&str> = words.collect();

        match directive {
            "graph" => match rest.as_slice() {
                [name] => graph.name = (*name).to_string(),
                _ => return Err(syntax(line, "expected `graph <name>`")),
            },
            "node" => parse_node(&mut graph, line, &rest)?,
            "edge" => parse_edge(&mut graph, line, &rest)?,
            "ctrl" => {
                let (src, dst) = split_arrow(line, &rest)?;
                let src = lookup(&graph, line, src)?;
                let dst = lookup(&graph, line, dst)?;
                graph
                    .add_control_edge(src, dst)
                    .map_err(|source| ParseError::Graph { line, source })?;
            }
            other => {
                return Err(ParseError::UnknownDirective {
                    line,
                    directive: other.to_string(),
                });
            }
        }
    }

    Ok(graph)
}

fn syntax(line: usize, message: impl Into<String>) -> ParseError {
    ParseError::Syntax {
        line,
        message: message.into(),
    }
}

fn lookup(graph: &Graph, line: usize, name: &str) -> Result<NodeHandle, ParseError> {
    graph.find(name).ok_or_else(|| ParseError::UnknownNode {
        line,
        name: name.to_string(),
    })
}

fn parse_node(graph: &mut Graph, line: usize, words: &[&str]) -> Result<(), ParseError> {
    let [name, op_type, props @ ..] = words else {
        return Err(syntax(line, "expected `node <name> <type> [key=value]...`"));
    };
    // ':' separates a node name from a slot in edge lines.
    if name.contains(':') {
        return Err(syntax(line, format!("node name '{name}' contains ':'")));
    }
    let handle = graph
        .add_node(*name, *op_type)
        .map_err(|source| ParseError::Graph { line, source })?;

    let mut slot0 = TensorDesc::default();
    let mut slot0_set = false;

    for prop in props {
        let Some((key, value)) = prop.split_once('=') else {
            return Err(syntax(line, format!("expected key=value, found '{prop}'")));
        };
        match key {
            "dtype" => {
                slot0.dtype = value.parse::<DataType>().map_err(|e| syntax(line, e))?;
                slot0_set = true;
            }
            "format" => {
                slot0.format = value.parse::<Format>().map_err(|e| syntax(line, e))?;
                slot0_set = true;
            }
            "shape" => {
                slot0.shape = parse_dims(line, value)?;
                slot0_set = true;
            }
            "categories" => {
                let list = value.split(',').map(str::to_string).collect();
                graph
                    .node_mut(handle)
                    .set_attr(CATEGORY_OVERRIDE_ATTR, AttrValue::StrList(list));
            }
            _ => {
                if let Some(slot) = key.strip_prefix("out") {
                    if let Ok(slot) = slot.parse::<u32>() {
                        let desc = parse_desc(line, value)?;
                        graph
                            .set_output_desc(handle, slot, desc)
                            .map_err(|source| ParseError::Graph { line, source })?;
                        continue;
                    }
                }
                if let Some(family) = key.strip_prefix("group.") {
                    let id = value
                        .parse::<u32>()
                        .map_err(|_| syntax(line, format!("bad group id '{value}'")))?;
                    graph.node_mut(handle).set_group(family, GroupId(id));
                    continue;
                }
                graph.node_mut(handle).set_attr(key, parse_attr(value));
            }
        }
    }

    if slot0_set {
        graph
            .set_output_desc(handle, 0, slot0)
            .map_err(|source| ParseError::Graph { line, source })?;
    }
    Ok(())
}

fn parse_edge(graph: &mut Graph, line: usize, words: &[&str]) -> Result<(), ParseError> {
    let (src, dst) = split_arrow(line, words)?;
    let (src_name, src_slot) = split_slot(line, src)?;
    let (dst_name, dst_slot) = split_slot(line, dst)?;
    let src = lookup(graph, line, src_name)?;
    let dst = lookup(graph, line, dst_name)?;

    let result = match dst_slot {
        Some(dst_slot) => graph.add_data_edge(src, src_slot.unwrap_or(0), dst, dst_slot),
        None => {
            let free = graph
                .node(dst)
                .inputs()
                .iter()
                .position(Option::is_none)
                .unwrap_or(graph.node(dst).inputs().len());
            graph.add_data_edge(src, src_slot.unwrap_or(0), dst, free as u32)
        }
    };
    result.map_err(|source| ParseError::Graph { line, source })
}

fn split_arrow<'a>(line: usize, words: &[&'a str]) -> Result<(&'a str, &'a str), ParseError> {
    match words {
        [src, "->", dst] => Ok((*src, *dst)),
        _ => Err(syntax(line, "expected `<src> -> <dst>`")),
    }
}

fn split_slot(line: usize, endpoint: &str) -> Result<(&str, Option<u32>), ParseError> {
    match endpoint.split_once(':') {
        None => Ok((endpoint, None)),
        Some((name, slot)) => {
            let slot = slot
                .parse::<u32>()
                .map_err(|_| syntax(line, format!("bad slot in '{endpoint}'")))?;
            Ok((name, Some(slot)))
        }
    }
}

fn parse_dims(line: usize, value: &str) -> Result<Vec<i64>, ParseError> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    value
        .split(',')
        .map(|d| match d {
            "?" => Ok(-1),
            _ => d
                .parse::<i64>()
                .map_err(|_| syntax(line, format!("bad dimension '{d}'"))),
        })
        .collect()
}

fn parse_desc(line: usize, value: &str) -> Result<TensorDesc, ParseError> {
    let mut parts = value.splitn(3, ':');
    let (Some(dtype), Some(format), Some(dims)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(syntax(
            line,
            format!("expected dtype:format:dims, found '{value}'"),
        ));
    };
    Ok(TensorDesc {
        dtype: dtype.parse().map_err(|e| syntax(line, e))?,
        format: format.parse().map_err(|e| syntax(line, e))?,
        shape: parse_dims(line, dims)?,
    })
}

fn parse_attr(value: &str) -> AttrValue {
    match value {
        "true" => AttrValue::Bool(true),
        "false" => AttrValue::Bool(false),
        _ => {
            if let Ok(v) = value.parse::<i64>() {
                AttrValue::Int(v)
            } else if value.contains(',') {
                AttrValue::StrList(value.split(',').map(str::to_string).collect())
            } else {
                AttrValue::Str(value.to_string())
            }
        }
    }
}
