/// Resolve a relationship `target` against the part that declares it.
///
/// Relative targets resolve against the source part's directory, absolute targets against the
/// package root. URI fragments are dropped since OPC part names never carry them.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.replace('\\', "/");
    let target = target.split('#').next().unwrap_or(&target);
    if target.is_empty() {
        // A target of just `#fragment` refers to the source part itself.
        return normalize(source_part);
    }
    if let Some(target) = target.strip_prefix('/') {
        return normalize(target);
    }

    // Non-standard but common: some producers write `xl/worksheets/sheet1.xml` (no leading `/`)
    // inside `xl/_rels/workbook.xml.rels`. Treat those as package-root paths instead of producing
    // `xl/xl/worksheets/...`.
    let normalized_target = normalize(target);
    if source_part.starts_with("xl/")
        && normalized_target
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("xl/"))
    {
        return normalized_target;
    }

    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{base_dir}/{target}"))
}

fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_target_relative_to_source_dir() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
    }

    #[test]
    fn resolve_target_strips_fragments() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml#rId1"),
            "xl/worksheets/sheet1.xml"
        );
    }

    #[test]
    fn resolve_target_hash_only_refs_source_part() {
        assert_eq!(resolve_target("xl/workbook.xml", "#rId1"), "xl/workbook.xml");
    }

    #[test]
    fn resolve_target_absolute_paths_are_normalized() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/../worksheets/sheet3.xml"),
            "xl/worksheets/sheet3.xml"
        );
    }

    #[test]
    fn resolve_target_handles_dot_segments() {
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "./../worksheets/./sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
    }

    #[test]
    fn resolve_target_tolerates_xl_prefixed_targets() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "xl/worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
    }

    #[test]
    fn resolve_target_normalizes_backslashes() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets\\sheet4.xml"),
            "xl/worksheets/sheet4.xml"
        );
    }
}
