//! Argument cleanup before handing a command to the front-end.

use std::path::Path;

/// Strip compile-to-object options and absolutize relative `-I` paths.
///
/// Removes `-c` and `-o <arg>` (the latter consumes the following token);
/// rewrites `-I<rel>` to `-I<directory>/<rel>`. Everything else passes
/// through in order.
pub fn sanitize_args(arguments: &[String], directory: &Path) -> Vec<String> {
    let mut out = Vec::with_capacity(arguments.len());
    let mut iter = arguments.iter();
    while let Some(arg) = iter.next() {
        if arg == "-c" {
            continue;
        }
        if arg == "-o" {
            let _ = iter.next();
            continue;
        }
        if let Some(rel) = arg.strip_prefix("-I")
            && !rel.is_empty()
            && !Path::new(rel).is_absolute()
        {
            out.push(format!("-I{}", directory.join(rel).display()));
            continue;
        }
        out.push(arg.clone());
    }
    out
}
