use clap::{crate_name, crate_version, value_parser, Arg, ArgAction, Command};
use crossbeam_channel::RecvTimeoutError;
use screengif::{CaptureTarget, DelayTiming, Event, FrameRate, ImgVec, LifecycleSignal, Settings, RGBA8};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

fn main() {
    if let Err(e) = bin_main() {
        eprintln!("error: {e}");
        if let Some(e) = e.source() {
            eprintln!("error: {e}");
        }
        std::process::exit(1);
    }
}

fn bin_main() -> BinResult<()> {
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about("Records a test pattern into an animated GIF")
        .arg(Arg::new("fps")
            .long("fps")
            .short('r')
            .help("Capture rate: 6, 10, 15, 30 or 60")
            .value_name("num")
            .value_parser(value_parser!(FrameRate))
            .default_value("15"))
        .arg(Arg::new("duration")
            .long("duration")
            .short('d')
            .help("How long to record, in seconds. Ctrl-C stops early")
            .value_name("s")
            .value_parser(value_parser!(f64))
            .default_value("3"))
        .arg(Arg::new("repeat")
            .long("loop")
            .help("Number of times the animation is repeated (0 forever)")
            .value_name("num")
            .value_parser(value_parser!(u16))
            .default_value("0"))
        .arg(Arg::new("cache-dir")
            .long("cache-dir")
            .help("Directory for temporary frames and the output GIF")
            .value_name("dir")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("size")
            .long("size")
            .short('s')
            .help("Size of the recorded surface")
            .value_name("WxH")
            .value_parser(parse_size)
            .default_value("320x240"))
        .arg(Arg::new("until-next")
            .long("until-next")
            .action(ArgAction::SetTrue)
            .help("Show each frame until the next capture, instead of since the previous one"))
        .arg(Arg::new("fast")
            .long("fast")
            .action(ArgAction::SetTrue)
            .help("Faster encoding, but worse quality"))
        .arg(Arg::new("quiet")
            .long("quiet")
            .short('q')
            .action(ArgAction::SetTrue)
            .help("Only print the path of the GIF"))
        .get_matches();

    let quiet = matches.get_flag("quiet");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if quiet { "warn" } else { "info" })).init();

    let settings = Settings {
        frame_rate: *matches.get_one::<FrameRate>("fps").ok_or("Missing fps")?,
        loop_count: *matches.get_one::<u16>("repeat").ok_or("Missing loop count")?,
        cache_dir: matches.get_one::<PathBuf>("cache-dir").cloned(),
        timing: if matches.get_flag("until-next") { DelayTiming::UntilNext } else { DelayTiming::SincePrevious },
        fast: matches.get_flag("fast"),
    };
    let duration = *matches.get_one::<f64>("duration").ok_or("Missing duration")?;
    if !(duration > 0.) {
        return Err("Duration must be positive".into());
    }
    let &(width, height) = matches.get_one::<(usize, usize)>("size").ok_or("Missing size")?;

    let (session, events) = screengif::new(settings);
    let session = Arc::new(session);
    let s = session.clone();
    ctrlc::set_handler(move || s.on_lifecycle(LifecycleSignal::Terminating))?;

    if let Err(kind) = session.start(Some(TestPattern::new(width, height))) {
        // details follow as Event::Failed
        log::debug!("start refused: {kind:?}");
    }

    let deadline = Instant::now() + Duration::from_secs_f64(duration);
    let mut stopping = false;
    loop {
        let event = if stopping {
            events.recv()?
        } else {
            match events.recv_deadline(deadline) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => {
                    session.stop();
                    stopping = true;
                    continue;
                },
                Err(RecvTimeoutError::Disconnected) => return Err("recording ended unexpectedly".into()),
            }
        };
        match event {
            Event::Started => if !quiet {
                eprintln!("recording {}×{} at {} for {duration}s", width, height, session.settings().frame_rate);
            },
            Event::Warning(err) => eprintln!("warning: {err}"),
            Event::Stopped => {
                stopping = true;
                if !quiet {
                    eprintln!("encoding {} frames", session.frame_count());
                }
            },
            Event::Completed { output, frames, cleanup_error } => {
                if let Some(err) = cleanup_error {
                    eprintln!("warning: {err}");
                }
                if !quiet {
                    eprintln!("screengif created {frames}-frame animation");
                }
                println!("{}", output.display());
                return Ok(());
            },
            Event::Failed(err) => return Err(err.into()),
        }
    }
}

fn parse_size(s: &str) -> Result<(usize, usize), String> {
    let (w, h) = s.split_once(['x', '×']).ok_or_else(|| format!("expected WxH, got \"{s}\""))?;
    let w: usize = w.trim().parse().map_err(|_| format!("invalid width \"{w}\""))?;
    let h: usize = h.trim().parse().map_err(|_| format!("invalid height \"{h}\""))?;
    if w == 0 || h == 0 || w > 4096 || h > 4096 {
        return Err("size must be between 1x1 and 4096x4096".into());
    }
    Ok((w, h))
}

/// Moving bar over a gradient, so consecutive frames differ
struct TestPattern {
    width: usize,
    height: usize,
    started: Instant,
}

impl TestPattern {
    fn new(width: usize, height: usize) -> Self {
        Self { width, height, started: Instant::now() }
    }
}

impl CaptureTarget for TestPattern {
    fn snapshot(&mut self) -> Option<ImgVec<RGBA8>> {
        let t = self.started.elapsed().as_secs_f64();
        let bar = ((t * 0.5).fract() * self.width as f64) as usize;
        let bar_width = (self.width / 10).max(1);
        let mut pixels = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                pixels.push(if x >= bar && x < bar + bar_width {
                    RGBA8::new(255, 255, 255, 255)
                } else {
                    RGBA8::new((x * 255 / self.width) as u8, (y * 255 / self.height) as u8, 128, 255)
                });
            }
        }
        Some(ImgVec::new(pixels, self.width, self.height))
    }
}
