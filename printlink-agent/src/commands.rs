//! Named printer commands for `printlink run <name> [args..]`.
//!
//! Each entry maps a name to a description and a handler. Handlers parse
//! their own arguments and fail before anything is published when an
//! argument is malformed.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use futures::future::BoxFuture;
use printlink_core::{
    CalibrationOptions, Fan, FanSpeed, FilamentPreset, LightMode, Printer, SpeedLevel,
    StartPrintJob,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

pub type Handler = for<'a> fn(&'a Printer, &'a [String]) -> BoxFuture<'a, Result<Value>>;

/// Result of one named command.
#[derive(Debug, Serialize)]
pub struct CommandOutcome {
    pub command: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub execution_time_ms: u128,
}

pub struct CommandEntry {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
    handler: Handler,
}

#[derive(Default)]
pub struct CommandRegistry {
    entries: BTreeMap<&'static str, CommandEntry>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &'static str,
        usage: &'static str,
        description: &'static str,
        handler: Handler,
    ) -> &mut Self {
        self.entries.insert(
            name,
            CommandEntry {
                name,
                usage,
                description,
                handler,
            },
        );
        self
    }

    /// Registry with every command the dispatcher offers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("refresh", "", "Request a full status report", refresh)
            .register("stop", "", "Stop the current job", stop)
            .register("pause", "", "Pause the current job", pause)
            .register("resume", "", "Resume a paused job", resume)
            .register("start", "<file> [plate]", "Start a stored project file", start)
            .register("skip", "<id>..", "Skip objects of the running job", skip)
            .register("light", "<on|off>", "Switch the chamber light", light)
            .register("speed", "<1-4>", "Set the print speed level", speed)
            .register("bed-temp", "<celsius>", "Set the bed target temperature", bed_temp)
            .register("nozzle-temp", "<celsius>", "Set the nozzle target temperature", nozzle_temp)
            .register(
                "fan",
                "<part|aux|chamber> <0-255|0.0-1.0>",
                "Set a fan speed",
                fan,
            )
            .register("home", "", "Home all axes", home)
            .register("bed-height", "<mm>", "Move the bed to an absolute height", bed_height)
            .register("gcode", "<line>..", "Send raw G-code lines", gcode)
            .register("calibrate", "", "Run every calibration", calibrate)
            .register(
                "external-filament",
                "<material id> <RRGGBB>",
                "Describe the material in the external slot",
                external_filament,
            )
            .register("load-filament", "", "Load filament from the external slot", load_filament)
            .register("unload-filament", "", "Unload the current filament", unload_filament)
            .register(
                "resume-filament",
                "",
                "Resume after a filament action",
                resume_filament,
            )
            .register("auto-recovery", "<on|off>", "Toggle automatic step-loss recovery", auto_recovery);
        registry
    }

    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries.values()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run `name`. Unknown names are an error; handler failures are reported
    /// in the outcome.
    pub async fn run(&self, printer: &Printer, name: &str, args: &[String]) -> Result<CommandOutcome> {
        let entry = self
            .get(name)
            .ok_or_else(|| anyhow!("unknown command '{name}', see `printlink commands`"))?;

        let started = Instant::now();
        debug!(command = name, ?args, "running command");
        let result = (entry.handler)(printer, args).await;
        let execution_time_ms = started.elapsed().as_millis();

        Ok(match result {
            Ok(output) => {
                info!(command = name, "command delivered");
                CommandOutcome {
                    command: name.to_string(),
                    success: true,
                    output: Some(output),
                    error: None,
                    execution_time_ms,
                }
            }
            Err(e) => CommandOutcome {
                command: name.to_string(),
                success: false,
                output: None,
                error: Some(format!("{e:#}")),
                execution_time_ms,
            },
        })
    }
}

fn arg<T>(args: &[String], index: usize, what: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow!("missing argument: {what}"))?;
    raw.parse()
        .with_context(|| format!("invalid {what}: {raw:?}"))
}

fn switch(args: &[String]) -> Result<bool> {
    match args.first().map(String::as_str) {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        Some(other) => bail!("expected on or off, got {other:?}"),
        None => bail!("missing argument: on|off"),
    }
}

fn delivered(sent: bool) -> Result<Value> {
    if sent {
        Ok(json!({"delivered": true}))
    } else {
        bail!("command was not delivered")
    }
}

fn refresh<'a>(printer: &'a Printer, _args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { delivered(printer.commands().push_all().await) })
}

fn stop<'a>(printer: &'a Printer, _args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { delivered(printer.commands().stop_print().await) })
}

fn pause<'a>(printer: &'a Printer, _args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { delivered(printer.commands().pause_print().await?) })
}

fn resume<'a>(printer: &'a Printer, _args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { delivered(printer.commands().resume_print().await?) })
}

fn start<'a>(printer: &'a Printer, args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let file: String = arg(args, 0, "file")?;
        let plate: u32 = if args.len() > 1 { arg(args, 1, "plate")? } else { 1 };
        delivered(printer.commands().start_print(StartPrintJob::new(file, plate)).await)
    })
}

fn skip<'a>(printer: &'a Printer, args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        if args.is_empty() {
            bail!("missing argument: object id");
        }
        let ids = (0..args.len())
            .map(|i| arg::<i64>(args, i, "object id"))
            .collect::<Result<Vec<_>>>()?;
        delivered(printer.commands().skip_objects(ids).await)
    })
}

fn light<'a>(printer: &'a Printer, args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let mode = if switch(args)? { LightMode::On } else { LightMode::Off };
        delivered(printer.commands().set_light(mode).await)
    })
}

fn speed<'a>(printer: &'a Printer, args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let level = SpeedLevel::from_level(arg(args, 0, "speed level")?)?;
        delivered(printer.commands().set_print_speed(level).await)
    })
}

fn bed_temp<'a>(printer: &'a Printer, args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let celsius = arg(args, 0, "temperature")?;
        delivered(printer.commands().set_bed_temperature(celsius).await?)
    })
}

fn nozzle_temp<'a>(printer: &'a Printer, args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let celsius = arg(args, 0, "temperature")?;
        delivered(printer.commands().set_nozzle_temperature(celsius).await?)
    })
}

fn parse_fan(name: &str) -> Result<Fan> {
    match name {
        "part" => Ok(Fan::Part),
        "aux" => Ok(Fan::Aux),
        "chamber" => Ok(Fan::Chamber),
        other => bail!("unknown fan {other:?}, expected part, aux or chamber"),
    }
}

/// `0.5` is a fraction of full speed, `128` a raw duty value.
fn parse_fan_speed(raw: &str) -> Result<FanSpeed> {
    if raw.contains('.') {
        Ok(FanSpeed::Fraction(raw.parse().with_context(|| format!("invalid fan speed {raw:?}"))?))
    } else {
        Ok(FanSpeed::Duty(raw.parse().with_context(|| format!("invalid fan speed {raw:?}"))?))
    }
}

fn fan<'a>(printer: &'a Printer, args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let fan = parse_fan(&arg::<String>(args, 0, "fan")?)?;
        let speed = parse_fan_speed(&arg::<String>(args, 1, "fan speed")?)?;
        delivered(printer.commands().set_fan_speed(fan, speed).await?)
    })
}

fn home<'a>(printer: &'a Printer, _args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { delivered(printer.commands().auto_home().await?) })
}

fn bed_height<'a>(printer: &'a Printer, args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let height = arg(args, 0, "height")?;
        delivered(printer.commands().set_bed_height(height).await?)
    })
}

fn gcode<'a>(printer: &'a Printer, args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        if args.is_empty() {
            bail!("missing argument: G-code line");
        }
        delivered(printer.commands().send_lines(args).await?)
    })
}

fn calibrate<'a>(printer: &'a Printer, _args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { delivered(printer.commands().calibrate(CalibrationOptions::default()).await) })
}

fn external_filament<'a>(printer: &'a Printer, args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        let id: String = arg(args, 0, "material id")?;
        let preset = FilamentPreset::from_material_id(&id)
            .ok_or_else(|| anyhow!("unknown material id {id:?}"))?;
        let color: String = arg(args, 1, "color")?;
        delivered(
            printer
                .commands()
                .set_external_filament(preset.setting(), &color)
                .await?,
        )
    })
}

fn load_filament<'a>(printer: &'a Printer, _args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { delivered(printer.commands().load_filament().await) })
}

fn unload_filament<'a>(printer: &'a Printer, _args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { delivered(printer.commands().unload_filament().await) })
}

fn resume_filament<'a>(printer: &'a Printer, _args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { delivered(printer.commands().resume_filament_action().await) })
}

fn auto_recovery<'a>(printer: &'a Printer, args: &'a [String]) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { delivered(printer.commands().set_auto_step_recovery(switch(args)?).await) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use printlink_core::ClientConfig;

    fn offline_printer() -> Printer {
        Printer::new(ClientConfig::new("127.0.0.1", "12345678", "01S00A000000000")).unwrap()
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_are_listed_in_name_order() {
        let registry = CommandRegistry::with_defaults();
        assert!(!registry.is_empty());
        let names: Vec<_> = registry.list().map(|entry| entry.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(registry.get("stop").is_some());
        assert_eq!(registry.get("speed").unwrap().usage, "<1-4>");
    }

    #[test]
    fn fan_arguments() {
        assert_eq!(parse_fan("aux").unwrap(), Fan::Aux);
        assert!(parse_fan("exhaust").is_err());
        assert!(matches!(parse_fan_speed("128").unwrap(), FanSpeed::Duty(128)));
        assert!(matches!(parse_fan_speed("0.5").unwrap(), FanSpeed::Fraction(f) if f == 0.5));
        assert!(parse_fan_speed("fast").is_err());
    }

    #[test]
    fn switch_argument() {
        assert!(switch(&args(&["on"])).unwrap());
        assert!(!switch(&args(&["off"])).unwrap());
        assert!(switch(&args(&["dim"])).is_err());
        assert!(switch(&[]).is_err());
    }

    #[tokio::test]
    async fn unknown_command_is_an_error() {
        let registry = CommandRegistry::with_defaults();
        let printer = offline_printer();
        assert!(registry.run(&printer, "explode", &[]).await.is_err());
    }

    #[tokio::test]
    async fn bad_arguments_fail_the_outcome() {
        let registry = CommandRegistry::with_defaults();
        let printer = offline_printer();

        let outcome = registry.run(&printer, "speed", &args(&["7"])).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("between 1 and 4"));

        let outcome = registry.run(&printer, "bed-temp", &args(&["hot"])).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("invalid temperature"));
    }

    #[tokio::test]
    async fn offline_printer_reports_undelivered() {
        let registry = CommandRegistry::with_defaults();
        let printer = offline_printer();

        let outcome = registry.run(&printer, "stop", &[]).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("command was not delivered"));
        assert!(outcome.output.is_none());
    }
}
