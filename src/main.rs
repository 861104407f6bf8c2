use rondel::{Options, Parser, Shared, Value, prev_ok, reflect};

const DEFAULT_RULES: &str = "demos/rules.xml";

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let data = match std::fs::read(&config.rules_path) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("error: failed to read {}: {err}", config.rules_path);
            std::process::exit(2);
        }
    };

    let options = Options {
        workflow_pattern: config.workflow.clone(),
        wildcard_workflow_pattern: config.wildcard,
        log_level: config.log_level.clone(),
        ..Options::default()
    };

    let parser = match Parser::from_bytes(&data, options) {
        Ok(parser) => parser,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    let person = Shared::new(Person { id: 1, age: 20, experience: 7, vacations: 4, position: "SSE".to_string(), salary: 0 });
    let company = Shared::new(Company { name: "acme".to_string() });
    parser.execute(&[person.value(), company.value()]);

    person.with(|p| {
        println!("person after rules: id={} age={} salary={} position={}", p.id, p.age, p.salary, p.position);
    });
}

struct Person {
    id: i64,
    age: i64,
    experience: i64,
    vacations: i64,
    position: String,
    salary: i64,
}

impl Person {
    fn set_age(&mut self, args: &[Value]) -> Value {
        if !prev_ok(args) {
            return Value::Bool(false);
        }
        if let Some(age) = args.first().and_then(Value::as_int) {
            self.age = age;
        }
        Value::Bool(true)
    }

    fn set_salary(&mut self, args: &[Value]) -> Value {
        if !prev_ok(args) {
            return Value::Bool(false);
        }
        if let Some(salary) = args.first().and_then(Value::as_int) {
            self.salary = salary;
        }
        Value::Bool(true)
    }
}

reflect! {
    Person in "hr" {
        fields {
            ID => id,
            Age => age,
            Experience => experience,
            Vacations => vacations,
            Position => position,
            Salary => salary,
        }
        methods { SetAge => set_age, SetSalary => set_salary }
    }
}

struct Company {
    name: String,
}

reflect! {
    Company in "hr" {
        fields { Name => name }
    }
}

struct CliConfig {
    rules_path: String,
    workflow: String,
    wildcard: bool,
    log_level: String,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut rules_path: Option<String> = None;
    let mut workflow = String::new();
    let mut wildcard = false;
    let mut log_level = "info".to_string();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("rondel {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--wildcard" => wildcard = true,
            "--workflow" => {
                workflow = args.next().ok_or_else(|| "error: --workflow expects a value".to_string())?;
            }
            "--log-level" => {
                log_level = args.next().ok_or_else(|| "error: --log-level expects a value".to_string())?;
            }
            _ if arg.starts_with("--workflow=") => {
                workflow = arg.trim_start_matches("--workflow=").to_string();
            }
            _ if arg.starts_with("--log-level=") => {
                log_level = arg.trim_start_matches("--log-level=").to_string();
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                if rules_path.is_some() {
                    return Err("error: rules file provided multiple times".to_string());
                }
                rules_path = Some(arg);
            }
        }
    }

    Ok(CliConfig {
        rules_path: rules_path.unwrap_or_else(|| DEFAULT_RULES.to_string()),
        workflow,
        wildcard,
        log_level,
    })
}

fn print_help() {
    println!(
        "rondel {version}

Declarative rules engine demo CLI.

Usage:
  rondel [OPTIONS] [rules-file]

Runs the bundled person/company demo values through the given rules file
(default: {default_rules}) and prints the mutated person.

Options:
  --workflow <pattern>   Workflow pattern for ruleset selection.
  --wildcard             Treat the workflow pattern as a ?/* wildcard.
  --log-level <level>    info|debug|warn|error|fatal. Default: info.
  -h, --help             Show this help message.
  -V, --version          Print version information.

Exit codes:
  0  Success.
  1  Rules failed to compile.
  2  Invalid arguments or unreadable rules file.
",
        version = env!("CARGO_PKG_VERSION"),
        default_rules = DEFAULT_RULES
    )
}
