use pdf_xray::core::{OutlineNode, XRefKind};
use pdf_xray::{DocumentStructure, Level, ObjectId, Value};
use std::env;
use std::fs;
use std::process;
use tracing_subscriber::EnvFilter;

/// Exit code when `--strict` is given and error-level issues exist.
const EXIT_STRICT: i32 = 2;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("PDF Structure Inspector");
        eprintln!("Usage: {} <pdf-file> [options]", args[0]);
        eprintln!("\nOptions:");
        eprintln!("  --all              Show every section");
        eprintln!("  --issues           List validation issues");
        eprintln!("  --stats            Show summary statistics");
        eprintln!("  --graph            Show reference graph summary");
        eprintln!("  --xref             Show cross-reference sections");
        eprintln!("  --trailer          Show trailer dictionary");
        eprintln!("  --outline          Show document outline (bookmarks)");
        eprintln!("  --object <n> [g]   Show a specific object");
        eprintln!("  --strict           Exit with status 2 when errors are found");
        eprintln!("\nLogging is controlled by RUST_LOG (default: warn).");
        process::exit(1);
    }

    let pdf_path = &args[1];
    let has = |flag: &str| args.iter().any(|x| x == flag);

    let show_all = has("--all");
    let show_issues = show_all || has("--issues");
    let show_stats = show_all || has("--stats");
    let show_graph = show_all || has("--graph");
    let show_xref = show_all || has("--xref");
    let show_trailer = show_all || has("--trailer");
    let show_outline = show_all || has("--outline");
    let strict = has("--strict");

    let object_id = match args.iter().position(|arg| arg == "--object") {
        Some(pos) => match parse_object_arg(&args[pos + 1..]) {
            Some(id) => Some(id),
            None => {
                eprintln!("Error: --object requires an object number");
                process::exit(1);
            }
        },
        None => None,
    };

    let data = match fs::read(pdf_path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", pdf_path, e);
            process::exit(1);
        }
    };

    let doc = match pdf_xray::parse(&data) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("Error parsing PDF: {}", e);
            process::exit(1);
        }
    };

    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║           PDF Structure Inspector                         ║");
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!("\nFile: {}\n", pdf_path);

    print_basic_info(&doc);

    if let Some(id) = object_id {
        println!("═══════════════ OBJECT {} ═══════════════", id);
        print_object(&doc, id);
        println!();
    }

    if show_stats {
        println!("═══════════════ STATISTICS ═══════════════");
        print_stats(&doc);
        println!();
    }

    println!("═══════════════ PAGES ═══════════════");
    print_pages(&doc);
    println!();

    if show_outline {
        println!("═══════════════ DOCUMENT OUTLINE ═══════════════");
        match &doc.logical.outlines {
            Some(root) if !root.children.is_empty() => {
                for child in &root.children {
                    print_outline(child, 0);
                }
            }
            _ => println!("No outline"),
        }
        println!();
    }

    if show_trailer {
        println!("═══════════════ TRAILER DICTIONARY ═══════════════");
        print_value(&Value::Dictionary(doc.physical.trailer.clone()), 0);
        println!();
    }

    if show_xref {
        println!("═══════════════ CROSS-REFERENCE SECTIONS ═══════════════");
        print_xref(&doc);
        println!();
    }

    if show_graph {
        println!("═══════════════ REFERENCE GRAPH ═══════════════");
        print_graph(&doc);
        println!();
    }

    println!("═══════════════ ISSUES ═══════════════");
    print_issue_summary(&doc);
    if show_issues {
        for issue in &doc.issues {
            println!("  {}", issue);
        }
    }

    if strict && doc.has_errors() {
        process::exit(EXIT_STRICT);
    }
}

/// Reads `N [G]` after `--object`.
fn parse_object_arg(rest: &[String]) -> Option<ObjectId> {
    let number = rest.first()?.parse::<u32>().ok()?;
    let generation = rest
        .get(1)
        .and_then(|g| g.parse::<u16>().ok())
        .unwrap_or(0);
    Some(ObjectId::new(number, generation))
}

fn format_size(size: usize) -> String {
    let size = size as f64;
    if size < 1024.0 {
        format!("{} B", size)
    } else if size < 1024.0 * 1024.0 {
        format!("{:.2} KB", size / 1024.0)
    } else if size < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", size / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", size / (1024.0 * 1024.0 * 1024.0))
    }
}

fn print_basic_info(doc: &DocumentStructure) {
    println!("═══════════════ BASIC INFORMATION ═══════════════");
    match &doc.physical.header {
        Some(header) => println!(
            "PDF Version: {} (header at offset {})",
            header.version, header.offset
        ),
        None => println!("PDF Version: Unknown"),
    }
    println!("File Size: {}", format_size(doc.physical.file_size));
    println!("Objects: {}", doc.stats.object_count);
    println!("Page Count: {}", doc.stats.page_count);
    println!("XRef Sections: {}", doc.physical.xref_sections.len());
    match doc.logical.catalog {
        Some(id) => println!("Catalog: {}", id),
        None => println!("Catalog: not found"),
    }
    println!();
}

fn print_object(doc: &DocumentStructure, id: ObjectId) {
    let Some(object) = doc.get_object(id.number, id.generation) else {
        println!("Object {} not found", id);
        return;
    };
    println!("Type: {}", object.object_type);
    println!("Offset: {}", object.offset);
    println!("Source: {:?}", object.source);
    print_value(&object.value, 0);
    if let Some(stream) = object.value.as_stream() {
        println!("Raw Length: {} bytes", stream.raw_data.len());
        match &stream.decoded_data {
            Some(decoded) => println!("Decoded Length: {} bytes", decoded.len()),
            None => println!("Decoded Length: (not decoded)"),
        }
    }
    let refs: Vec<String> = doc.graph.incoming(id).map(|e| e.from.to_string()).collect();
    if !refs.is_empty() {
        println!("Referenced by: {}", refs.join(", "));
    }
}

fn print_value(value: &Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Dictionary(dict) => {
            println!("{}<<", pad);
            for (key, value) in dict.iter() {
                match value {
                    Value::Dictionary(_) | Value::Array(_) => {
                        println!("{}  /{}", pad, key);
                        print_value(value, indent + 2);
                    }
                    _ => println!("{}  /{} {}", pad, key, value),
                }
            }
            println!("{}>>", pad);
        }
        Value::Stream(stream) => {
            print_value(&Value::Dictionary(stream.dict.clone()), indent);
            println!("{}stream", pad);
        }
        Value::Array(items) if items.len() > 8 => {
            println!("{}[ {} items ]", pad, items.len());
        }
        other => println!("{}{}", pad, other),
    }
}

fn print_stats(doc: &DocumentStructure) {
    let stats = &doc.stats;
    println!("Objects: {}", stats.object_count);
    println!("Streams: {}", stats.stream_count);
    println!("Average Object Size: {:.1} bytes", stats.avg_object_size);
    println!("Compression Ratio: {:.2}", stats.compression_ratio);
    println!("JavaScript: {}", yes_no(stats.has_javascript));
    println!("Embedded Files: {}", yes_no(stats.has_embedded_files));
    println!("External Links: {}", yes_no(stats.has_external_links));
    println!("\nObject Types:");
    let mut types: Vec<(&String, &usize)> = stats.type_histogram.iter().collect();
    types.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (name, count) in types {
        println!("  {:<20} {}", name, count);
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

fn print_pages(doc: &DocumentStructure) {
    if doc.logical.pages.is_empty() {
        println!("No pages found");
        return;
    }
    for (index, page) in doc.pages().iter().enumerate() {
        let media_box = page
            .properties
            .get("MediaBox")
            .map(|b| b.to_string())
            .unwrap_or_else(|| "(inherited)".to_string());
        println!("  Page {}: {} MediaBox {}", index + 1, page.id, media_box);
    }
}

fn print_outline(node: &OutlineNode, depth: usize) {
    println!(
        "{}- {}",
        "  ".repeat(depth),
        node.title.as_deref().unwrap_or("(untitled)")
    );
    for child in &node.children {
        print_outline(child, depth + 1);
    }
}

fn print_xref(doc: &DocumentStructure) {
    if doc.physical.xref_sections.is_empty() {
        println!("No readable cross-reference sections");
    }
    for section in &doc.physical.xref_sections {
        let kind = match section.kind {
            XRefKind::Table => "table",
            XRefKind::Stream => "stream",
        };
        println!(
            "  {} at offset {}: {} entries",
            kind,
            section.offset,
            section.entries.len()
        );
    }
    if let Some(start) = doc.physical.start_xref {
        println!("startxref: {}", start);
    }
}

fn print_graph(doc: &DocumentStructure) {
    let graph = &doc.graph;
    println!("Edges: {}", graph.edges().len());
    println!("Dangling: {}", graph.dangling_edges().count());
    if let Some(catalog) = doc.logical.catalog {
        let mut roots = vec![catalog];
        roots.extend(doc.logical.info);
        let unreachable = graph.unreachable(&roots);
        println!("Unreachable from catalog: {}", unreachable.len());
    }
    let mut widest: Vec<(ObjectId, usize)> = doc
        .objects()
        .iter()
        .map(|o| (o.id, graph.fan_out(o.id)))
        .filter(|(_, n)| *n > 0)
        .collect();
    widest.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (id, fan_out) in widest.into_iter().take(5) {
        println!("  {} -> {} objects", id, fan_out);
    }
}

fn print_issue_summary(doc: &DocumentStructure) {
    let count = |level| doc.issues_by_level(level).len();
    println!(
        "Errors: {}  Warnings: {}  Info: {}",
        count(Level::Error),
        count(Level::Warning),
        count(Level::Info)
    );
}
