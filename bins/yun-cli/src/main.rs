//! yun - 不解码的转封装命令行工具
//!
//! 子命令:
//! - `remux`: 单个输入转封装到单个输出
//! - `segment`: 按时长在关键帧处切分为多个文件
//! - `mux`: 视频、音频两个原始流交织封装
//! - `scan`: 读完输入, 输出最后的连续性计数器
//! - `stat`: 输出格式与流信息
//! - `ingest`: RTP 归档 (MJR/pcap) 中的 VP8、Opus 流重组后交织封装
//! - `split`: 把 RTP 归档按时长或包数切成多个 MJR 归档
//!
//! 结果以 JSON 写到 stdout, 日志写到 stderr 和 logs/ 目录.
//! Ctrl-C 触发协作式中止, 此时退出码为 130.

mod logging;
mod parse;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;

use yun_codec::Packet;
use yun_core::{MediaType, YunError, YunResult};
use yun_format::{FormatHint, FormatRegistry, IoContext, MuxOptions};
use yun_remux::{
    DemuxSource, FilterAction, MonotonicFilter, MuxFlags, MuxInput, PacketFilter, PacketSource,
    PendingSink, RemuxOptions, SegmentOptions, SegmentTemplate, mux, mux_streams, remux, scan,
    segment_to_files, stat,
};
use yun_rtp::{
    ArchivePart, ArchiveSet, PayloadKind, RtpFilter, RtpPackets, RtpSource, RtpSourceOptions,
    SplitOptions, StreamDescription, split_archive,
};

use parse::{
    apply_mux_options, apply_offsets, default_split_template, load_config, load_counters,
    parse_range,
};

/// Ctrl-C 置位, 各操作每个数据包轮询一次
static ABORT: AtomicBool = AtomicBool::new(false);

/// 中止时的退出码 (128 + SIGINT)
const EXIT_ABORTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "yun", version, about = "不解码的转封装工具: 转封装、分段、交织封装")]
struct Cli {
    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 转封装单个输入
    Remux(RemuxArgs),
    /// 按时长切分为多个文件
    Segment(SegmentArgs),
    /// 交织封装视频、音频两路输入
    Mux(MuxArgs),
    /// 读完输入并输出连续性计数器
    Scan(ScanArgs),
    /// 输出输入的格式与流信息
    Stat(InputArgs),
    /// 把 RTP 归档中的 VP8、Opus 流封装到一个输出
    Ingest(IngestArgs),
    /// 把一个 RTP 归档切成多个 MJR 归档
    Split(SplitArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// 输入文件
    input: PathBuf,

    /// 输入格式名, 缺省时探测
    #[arg(long = "input-format")]
    input_format: Option<String>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// 输出格式名 (mpegts, yunraw), 缺省时由扩展名推断
    #[arg(short, long)]
    format: Option<String>,

    /// 封装器选项, 可重复 (如 -o psi_period=20)
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,
}

#[derive(Args, Debug)]
struct ContinuityArgs {
    /// 注入的连续性计数器 (scan/remux/segment 的 JSON 输出)
    #[arg(long = "cc-file")]
    cc_file: Option<PathBuf>,

    /// 导出的连续性计数器上限
    #[arg(long = "max-cc")]
    max_cc: Option<usize>,

    /// JSON 选项文件, 命令行参数覆盖其中的值
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RemuxArgs {
    #[command(flatten)]
    input: InputArgs,

    /// 输出文件
    output: PathBuf,

    #[command(flatten)]
    out: OutputArgs,

    #[command(flatten)]
    cc: ContinuityArgs,

    /// 时间戳偏移 (源时间基单位), 可重复
    #[arg(long = "offset", value_name = "INDEX=TICKS")]
    offsets: Vec<String>,

    /// 只保留某条流上的帧序号窗口, 两端可留空
    #[arg(long, value_name = "INDEX:BEGIN:END")]
    range: Option<String>,

    /// 丢弃 pts 非单调递增的数据包
    #[arg(long)]
    monotonic: bool,
}

#[derive(Args, Debug)]
struct SegmentArgs {
    #[command(flatten)]
    input: InputArgs,

    /// 分段文件名模板, 含一个 %d 或 %0Nd (如 out-%03d.ts)
    template: String,

    #[command(flatten)]
    out: OutputArgs,

    #[command(flatten)]
    cc: ContinuityArgs,

    /// 目标分段时长 (秒)
    #[arg(short, long)]
    duration: Option<f64>,

    /// 安全余量 (秒)
    #[arg(long)]
    margin: Option<f64>,

    /// 参考流索引
    #[arg(long = "ref-stream")]
    ref_stream: Option<usize>,
}

#[derive(Args, Debug)]
struct MuxArgs {
    /// 视频输入 (yunraw 等单流文件)
    #[arg(long)]
    video: Option<PathBuf>,

    /// 音频输入
    #[arg(long)]
    audio: Option<PathBuf>,

    /// 输出文件
    output: PathBuf,

    #[command(flatten)]
    out: OutputArgs,

    /// 丢弃 pts 非单调递增的数据包
    #[arg(long)]
    monotonic: bool,
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[command(flatten)]
    input: InputArgs,

    /// 导出的连续性计数器上限
    #[arg(long = "max-cc", default_value_t = yun_remux::DEFAULT_MAX_COUNTERS)]
    max_cc: usize,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// 输出文件
    output: PathBuf,

    /// 流描述: vp8,opus 表示归档按流分组排列, vp8!opus 表示交替排列
    description: String,

    /// MJR 或 pcap 归档, 按流描述的顺序给出
    #[arg(required = true)]
    archives: Vec<PathBuf>,

    #[command(flatten)]
    out: OutputArgs,

    /// 按流描述顺序给出各路流的包过滤, 可重复 (如 pt=96,ssrc=1234)
    #[arg(long = "filter", value_name = "KEY=VALUE,...")]
    filters: Vec<String>,

    /// 按流描述顺序给出各路流的参数覆盖, 可重复 (如 width=640,height=480)
    #[arg(long = "profile", value_name = "KEY=VALUE,...")]
    profiles: Vec<String>,

    /// 每路流跳过开头的归档数
    #[arg(long = "skip-parts", default_value_t = 0)]
    skip_parts: usize,

    /// 估计帧率用的帧数
    #[arg(long = "frame-rate-window", default_value_t = yun_rtp::infer::DEFAULT_FRAME_RATE_WINDOW)]
    frame_rate_window: usize,

    /// 丢弃 pts 非单调递增的数据包
    #[arg(long)]
    monotonic: bool,
}

#[derive(Args, Debug)]
struct SplitArgs {
    /// 负载种类 (vp8, opus)
    kind: String,

    /// 输入归档 (MJR 或 pcap)
    input: PathBuf,

    /// 输出文件名模板, 含一个 %d 或 %0Nd, 缺省为 <输入名>-%02d.mjr
    template: Option<String>,

    /// 每段时长上限 (秒)
    #[arg(short, long)]
    duration: Option<f64>,

    /// 每段包数上限
    #[arg(short, long)]
    count: Option<u64>,

    /// 包过滤 (如 pt=96,ssrc=1234)
    #[arg(long)]
    filter: Option<String>,

    /// 覆盖已存在的输出
    #[arg(long)]
    force: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init("yun-cli", cli.verbose) {
        eprintln!("错误: {e:#}");
        return ExitCode::FAILURE;
    }
    if let Err(e) = ctrlc::set_handler(|| ABORT.store(true, Ordering::SeqCst)) {
        warn!("无法安装 Ctrl-C 处理: {e}");
    }

    let mut registry = FormatRegistry::new();
    yun_format::register_all(&mut registry);

    match run(cli.command, &registry) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("错误: {e:#}");
            let aborted = e.downcast_ref::<YunError>().is_some_and(YunError::is_aborted);
            if aborted {
                ExitCode::from(EXIT_ABORTED)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(command: Command, registry: &FormatRegistry) -> anyhow::Result<()> {
    match command {
        Command::Remux(args) => run_remux(args, registry),
        Command::Segment(args) => run_segment(args, registry),
        Command::Mux(args) => run_mux(args, registry),
        Command::Scan(args) => run_scan(args, registry),
        Command::Stat(args) => run_stat(args, registry),
        Command::Ingest(args) => run_ingest(args, registry),
        Command::Split(args) => run_split(args),
    }
}

fn open_source(registry: &FormatRegistry, path: &Path, format: Option<&str>) -> anyhow::Result<DemuxSource> {
    DemuxSource::open_file(registry, path, format)
        .with_context(|| format!("打开输入 {} 失败", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_remux(args: RemuxArgs, registry: &FormatRegistry) -> anyhow::Result<()> {
    let mut options: RemuxOptions = load_config(args.cc.config.as_deref())?;
    apply_offsets(&mut options.offsets, &args.offsets)?;
    apply_mux_options(&mut options.mux_options, &args.out.options)?;
    if let Some(path) = &args.cc.cc_file {
        options.counters = load_counters(path)?;
    }
    if let Some(max) = args.cc.max_cc {
        options.max_counters = max;
    }

    let mut source = open_source(registry, &args.input.input, args.input.input_format.as_deref())?;
    let sink = PendingSink::create_file(
        registry,
        &args.output,
        args.out.format.as_deref(),
        source.streams(),
    )
    .with_context(|| format!("创建输出 {} 失败", args.output.display()))?;

    // 按顺序询问各过滤器, 第一个非 Keep 的结果生效
    let mut filters: Vec<Box<dyn PacketFilter>> = Vec::new();
    if let Some(range) = &args.range {
        filters.push(Box::new(parse_range(range)?));
    }
    if args.monotonic {
        filters.push(Box::new(MonotonicFilter::new()));
    }
    let mut chain = |packet: &Packet| {
        filters
            .iter_mut()
            .map(|f| f.filter(packet))
            .find(|action| *action != FilterAction::Keep)
            .unwrap_or(FilterAction::Keep)
    };
    let has_filters = args.range.is_some() || args.monotonic;
    let filter: Option<&mut dyn PacketFilter> = if has_filters { Some(&mut chain) } else { None };

    info!("转封装 {} -> {}", args.input.input.display(), args.output.display());
    let stats = remux(&mut source, sink, filter, &options, &ABORT).context("转封装失败")?;
    print_json(&stats)
}

fn run_segment(args: SegmentArgs, registry: &FormatRegistry) -> anyhow::Result<()> {
    let mut options: SegmentOptions = load_config(args.cc.config.as_deref())?;
    if let Some(duration) = args.duration {
        options.duration = duration;
    }
    if let Some(margin) = args.margin {
        options.margin = margin;
    }
    if args.ref_stream.is_some() {
        options.ref_stream = args.ref_stream;
    }
    apply_mux_options(&mut options.mux_options, &args.out.options)?;
    if let Some(path) = &args.cc.cc_file {
        options.counters = load_counters(path)?;
    }
    if let Some(max) = args.cc.max_cc {
        options.max_counters = max;
    }

    let mut source = open_source(registry, &args.input.input, args.input.input_format.as_deref())?;
    info!("分段 {} -> {}", args.input.input.display(), args.template);
    let report = segment_to_files(
        &mut source,
        registry,
        args.out.format.as_deref(),
        &args.template,
        &options,
        &ABORT,
    )
    .context("分段失败")?;
    print_json(&report)
}

fn run_mux(args: MuxArgs, registry: &FormatRegistry) -> anyhow::Result<()> {
    let mut video = args.video.as_deref().map(|p| open_source(registry, p, None)).transpose()?;
    let mut audio = args.audio.as_deref().map(|p| open_source(registry, p, None)).transpose()?;
    let video_in = video.as_mut().map(|s| MuxInput::new(s));
    let audio_in = audio.as_mut().map(|s| MuxInput::new(s));

    let streams = mux_streams(video_in.as_ref(), audio_in.as_ref())?;
    let sink = PendingSink::create_file(registry, &args.output, args.out.format.as_deref(), &streams)
        .with_context(|| format!("创建输出 {} 失败", args.output.display()))?;
    let mut options = MuxOptions::new();
    apply_mux_options(&mut options, &args.out.options)?;

    let flags = MuxFlags {
        monotonic: args.monotonic,
    };
    let stats = mux(sink, video_in, audio_in, flags, &options, &ABORT).context("交织封装失败")?;
    print_json(&stats)
}

fn run_scan(args: ScanArgs, registry: &FormatRegistry) -> anyhow::Result<()> {
    let mut source = open_source(registry, &args.input.input, args.input.input_format.as_deref())?;
    let report = scan(&mut source, args.max_cc, &ABORT).context("扫描失败")?;
    print_json(&report)
}

fn run_stat(args: InputArgs, registry: &FormatRegistry) -> anyhow::Result<()> {
    let hint = FormatHint {
        name: args.input_format.clone(),
        filename: Some(args.input.to_string_lossy().into_owned()),
    };
    let io = IoContext::open_read(&args.input)
        .with_context(|| format!("打开输入 {} 失败", args.input.display()))?;
    let report = stat(registry, io, &hint)?;
    print_json(&report)
}

fn run_ingest(args: IngestArgs, registry: &FormatRegistry) -> anyhow::Result<()> {
    let description: StreamDescription = args.description.parse()?;
    let buckets = description.bucket(&args.archives)?;

    let mut video: Option<RtpSource> = None;
    let mut audio: Option<RtpSource> = None;
    for (i, (kind, parts)) in buckets.into_iter().enumerate() {
        let mut set = ArchiveSet::new(kind, parts.into_iter().map(ArchivePart::File).collect());
        set.skip_parts = args.skip_parts;
        if let Some(filter) = args.filters.get(i) {
            set.filter = filter.parse().with_context(|| format!("第 {} 路流的过滤条件无效", i + 1))?;
        }
        let mut options = RtpSourceOptions {
            frame_rate_window: args.frame_rate_window,
            ..Default::default()
        };
        if let Some(profile) = args.profiles.get(i) {
            options.profile = profile.parse().with_context(|| format!("第 {} 路流的参数无效", i + 1))?;
        }
        let slot = match kind.media_type() {
            MediaType::Video => &mut video,
            _ => &mut audio,
        };
        if slot.is_some() {
            anyhow::bail!("流描述 {:?} 中最多一路视频、一路音频", args.description);
        }
        let source = RtpSource::open(&set, &options).with_context(|| format!("打开 {kind} 归档失败"))?;
        *slot = Some(source);
    }

    let video_in = video.as_mut().map(|s| MuxInput::new(s));
    let audio_in = audio.as_mut().map(|s| MuxInput::new(s));
    let streams = mux_streams(video_in.as_ref(), audio_in.as_ref())?;
    let sink = PendingSink::create_file(registry, &args.output, args.out.format.as_deref(), &streams)
        .with_context(|| format!("创建输出 {} 失败", args.output.display()))?;
    let mut options = MuxOptions::new();
    apply_mux_options(&mut options, &args.out.options)?;

    info!("RTP 归档 {} 个 -> {}", args.archives.len(), args.output.display());
    let flags = MuxFlags {
        monotonic: args.monotonic,
    };
    let stats = mux(sink, video_in, audio_in, flags, &options, &ABORT).context("RTP 归档封装失败")?;
    print_json(&stats)
}

fn run_split(args: SplitArgs) -> anyhow::Result<()> {
    let kind: PayloadKind = args.kind.parse()?;
    let filter: RtpFilter = match &args.filter {
        Some(filter) => filter.parse()?,
        None => RtpFilter::default(),
    };
    let template = args
        .template
        .clone()
        .unwrap_or_else(|| default_split_template(&args.input));
    let template = SegmentTemplate::parse(&template)?;
    let options = SplitOptions {
        duration: args.duration,
        count: args.count,
    };
    let force = args.force;
    let opener = |name: &str| -> YunResult<IoContext> {
        if !force && Path::new(name).exists() {
            return Err(YunError::BadValue(format!("输出 {name} 已存在, 使用 --force 覆盖")));
        }
        IoContext::open_write(name)
    };

    info!("切分 {} -> {template}", args.input.display());
    let mut packets = RtpPackets::new(vec![ArchivePart::File(args.input.clone())], filter);
    let report = split_archive(&mut packets, kind, &template, opener, &options, &ABORT).context("切分失败")?;
    print_json(&report)
}
