use crate::{LogArgs, ERR, WARN, YES};
use gguf_probe::{
    AlignmentReport, GGufFile, GGufFileHeader, GGufMetaKV, GGufMetaMapExt, GGufMetaValue,
    GGufTensorInfo, ParseOptions, ParseStatus,
};
use itertools::Itertools;
use std::{fmt, fs::File, path::PathBuf};

#[derive(Args, Default)]
pub struct ShowArgs {
    /// The gguf file to inspect
    file: PathBuf,
    /// Max count of tensors to decode
    #[clap(long, short = 't')]
    max_tensors: Option<usize>,
    /// Stop at the last decoded tensor instead of walking the rest of the table
    #[clap(long)]
    no_locate: bool,

    #[clap(flatten)]
    log: LogArgs,
}

impl From<&ShowArgs> for ParseOptions {
    fn from(args: &ShowArgs) -> Self {
        Self {
            max_tensors: args.max_tensors.unwrap_or(usize::MAX),
            locate_data_section: !args.no_locate,
        }
    }
}

impl ShowArgs {
    pub fn show(self) {
        let options = ParseOptions::from(&self);
        let Self { file, log, .. } = self;
        log.init();

        let file_name = file.display().to_string();
        println!(
            "\
+-{0:-<1$}-+
| {file_name} |
+-{0:-<1$}-+
",
            "",
            file_name.len()
        );

        let file = match File::open(&file).and_then(|f| unsafe { memmap2::Mmap::map(&f) }) {
            Ok(mmap) => mmap,
            Err(e) => {
                println!("{ERR}{e}");
                return;
            }
        };
        let gguf = match GGufFile::with_options(&file, options) {
            Ok(gguf) => gguf,
            Err(e) => {
                println!("{ERR}{e}");
                return;
            }
        };

        show_header(&gguf.header, file.len());
        show_meta_kvs(&gguf.meta_kvs);
        show_tensors(&gguf);
        show_warnings(&gguf);
    }
}

fn show_title(title: &str) {
    println!(
        "\
{title}
{0:=<1$}
",
        "",
        title.len()
    );
}

fn show_header(header: &GGufFileHeader, len: usize) {
    show_title("Header");
    println!("{YES}Magic   = {:?}", header.magic().unwrap_or("????"));
    println!("{YES}Version = {}", header.version);
    println!("{YES}MetaKVs = {}", header.metadata_kv_count);
    println!("{YES}Tensors = {}", header.tensor_count);
    println!("{YES}Size    = {len} bytes");
    println!();
}

fn show_meta_kvs(kvs: &[GGufMetaKV]) {
    show_title("Meta KV");

    let Some(width) = kvs.iter().map(|kv| kv.key.len()).max() else {
        return;
    };
    for kv in kvs {
        let mut buf = String::new();
        fmt_meta_val(&kv.value, &mut buf);
        let mark = if !kv.value.is_resolved() {
            ERR
        } else if kv.value.invalid_bool().is_some() {
            WARN
        } else {
            YES
        };
        println!("{mark}{:·<width$} {buf}", kv.key);
    }
    println!();
}

fn fmt_meta_val(val: &GGufMetaValue, buf: &mut String) {
    struct MultiLines<'a>(&'a str);
    impl fmt::Display for MultiLines<'_> {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            writeln!(f)?;
            writeln!(f, "   +--")?;
            for line in self.0.lines() {
                writeln!(f, "   | {}", line)?;
            }
            write!(f, "   +--")
        }
    }

    fn fmt_exp(e: f64) -> String {
        if e == 0. {
            String::from("0")
        } else if e.abs().log10().abs() > 3. {
            format!("{e:e}")
        } else {
            format!("{e}")
        }
    }

    use GGufMetaValue as V;
    match val {
        V::U8(v) => buf.push_str(&v.to_string()),
        V::I8(v) => buf.push_str(&v.to_string()),
        V::U16(v) => buf.push_str(&v.to_string()),
        V::I16(v) => buf.push_str(&v.to_string()),
        V::U32(v) => buf.push_str(&v.to_string()),
        V::I32(v) => buf.push_str(&v.to_string()),
        V::U64(v) => buf.push_str(&v.to_string()),
        V::I64(v) => buf.push_str(&v.to_string()),
        V::F32(v) => buf.push_str(&fmt_exp(*v as _)),
        V::F64(v) => buf.push_str(&fmt_exp(*v)),
        V::Bool(v) => buf.push(if *v { '√' } else { '×' }),
        V::InvalidBool(b) => buf.push_str(&format!("<bool {b:#04x} (invalid)>")),
        V::String(s) => {
            if s.lines().nth(1).is_some() {
                buf.push_str(&format!("{}", MultiLines(s)));
            } else {
                buf.push_str(&format!("`{s}`"));
            }
        }
        V::Array(arr) if arr.len == 0 => buf.push_str("[]"),
        V::Array(arr) => {
            buf.push('[');
            for (i, item) in arr.items.iter().take(8).enumerate() {
                if i > 0 {
                    buf.push_str(", ");
                }
                fmt_meta_val(item, buf);
            }
            if arr.len > 8 {
                buf.push_str(&format!(", ...({} more)", arr.len - 8));
            }
            buf.push(']');
        }
        V::Unknown(ty) => buf.push_str(&format!("<type {ty} (unrecognized)>")),
    }
}

/// Payload bytes previewed for packed tensors.
const PREVIEW_NBYTES: usize = 16;

fn show_tensors(gguf: &GGufFile) {
    show_title("Tensors");

    let Some(name_width) = gguf.tensors.iter().map(|t| t.name().len()).max() else {
        return;
    };
    let off_width = gguf
        .tensors
        .iter()
        .map(GGufTensorInfo::offset)
        .max()
        .map_or(1, |off| format!("{off:x}").len() + 2);
    match (gguf.data_section_start, gguf.tensor_data_start()) {
        (Some(start), Some(data_start)) => println!(
            "{YES}data section at {start:#x}, tensors from {data_start:#x} (alignment {})",
            gguf.alignment(),
        ),
        _ => println!("{WARN}data section not located, alignment not checked"),
    }
    let mut reports = gguf.diagnose();
    for t in &gguf.tensors {
        let report = reports.as_mut().and_then(|it| it.next()).map(|(_, r)| r);
        let mark = match &report {
            Some(r) if !r.offset_in_bounds || r.payload_in_bounds == Some(false) => ERR,
            Some(r) if r.packing_risk => WARN,
            _ if !t.ty().is_recognized() => WARN,
            _ => YES,
        };
        let size = t
            .nbytes()
            .map_or_else(|| String::from("?"), |n| n.to_string());
        let mut line = format!(
            "{mark}{:·<name_width$} {} +{:<#0off_width$x} [{}] {size} bytes",
            t.name(),
            t.ty(),
            t.offset(),
            t.shape().iter().join(", "),
        );
        match &report {
            Some(report) => {
                line.push(' ');
                line.push_str(&fmt_alignment(report));
                if t.ty().is_packed() {
                    if let Some(preview) = fmt_preview(gguf.data(), report) {
                        line.push_str(&format!(" <{preview}>"));
                    }
                }
            }
            None => line.push_str(" align ?"),
        }
        println!("{line}");
    }
    if gguf.tensors.len() as u64 != gguf.header.tensor_count {
        println!(
            "{YES}...({} more)",
            gguf.header.tensor_count - gguf.tensors.len() as u64
        );
    }
    println!();
}

fn fmt_alignment(report: &AlignmentReport) -> String {
    let mut ans = format!("align {}", report.alignment_class());
    if report.packing_risk {
        ans.push_str(", packing risk");
    }
    if !report.offset_in_bounds {
        ans.push_str(", offset out of bounds");
    } else if report.payload_in_bounds == Some(false) {
        ans.push_str(", payload out of bounds");
    }
    ans
}

/// Hex dump of the first payload bytes, `None` when the payload starts past the buffer.
fn fmt_preview(data: &[u8], report: &AlignmentReport) -> Option<String> {
    let start = usize::try_from(report.absolute_offset).ok()?;
    let payload = data.get(start..).filter(|p| !p.is_empty())?;
    Some(
        payload[..payload.len().min(PREVIEW_NBYTES)]
            .iter()
            .map(|b| format!("{b:02x}"))
            .join(" "),
    )
}

fn show_warnings(gguf: &GGufFile) {
    if !gguf.warnings.is_empty() {
        show_title("Warnings");
        for w in &gguf.warnings {
            let mark = if w.is_truncation() { ERR } else { WARN };
            println!("{mark}{w}");
        }
        println!();
    }

    let arch = gguf.general_architecture().unwrap_or("unknown");
    match gguf.status() {
        ParseStatus::Complete => println!("{YES}Decoded {arch} model completely."),
        ParseStatus::Partial => println!("{ERR}Decoded {arch} model partially, see warnings."),
    }
}

#[test]
fn test_fmt_meta_val() {
    use gguf_probe::GGufMetaArray;

    let fmt = |val: &GGufMetaValue| {
        let mut buf = String::new();
        fmt_meta_val(val, &mut buf);
        buf
    };
    assert_eq!(fmt(&GGufMetaValue::U32(7)), "7");
    assert_eq!(fmt(&GGufMetaValue::F32(0.25)), "0.25");
    assert_eq!(fmt(&GGufMetaValue::F64(1e10)), "1e10");
    assert_eq!(fmt(&GGufMetaValue::String("llama".into())), "`llama`");
    assert_eq!(fmt(&GGufMetaValue::Unknown(13)), "<type 13 (unrecognized)>");
    assert_eq!(fmt(&GGufMetaValue::InvalidBool(2)), "<bool 0x02 (invalid)>");

    let arr = GGufMetaArray {
        ty: 5,
        len: 10,
        items: (0..10).map(GGufMetaValue::I32).collect(),
    };
    assert_eq!(
        fmt(&GGufMetaValue::Array(arr)),
        "[0, 1, 2, 3, 4, 5, 6, 7, ...(2 more)]"
    );
}

#[test]
fn test_fmt_preview() {
    let report = |absolute_offset| AlignmentReport {
        absolute_offset,
        residue_4: 0,
        residue_8: 0,
        residue_16: 0,
        offset_in_bounds: true,
        payload_in_bounds: None,
        packing_risk: false,
    };
    let data = (0..40).collect::<Vec<u8>>();
    assert_eq!(
        fmt_preview(&data, &report(4)).as_deref(),
        Some("04 05 06 07 08 09 0a 0b 0c 0d 0e 0f 10 11 12 13")
    );
    assert_eq!(fmt_preview(&data, &report(38)).as_deref(), Some("26 27"));
    assert_eq!(fmt_preview(&data, &report(40)), None);
    assert_eq!(fmt_preview(&data, &report(u64::MAX)), None);
}

#[test]
fn test_parse_options() {
    let args = ShowArgs {
        max_tensors: Some(5),
        no_locate: true,
        ..Default::default()
    };
    assert_eq!(
        ParseOptions::from(&args),
        ParseOptions {
            max_tensors: 5,
            locate_data_section: false,
        }
    );
    assert_eq!(
        ParseOptions::from(&ShowArgs::default()),
        ParseOptions::default()
    );
}
