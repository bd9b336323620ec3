use alphabet_sprint::{
    app_dirs::AppDirs,
    clock::SystemClock,
    config::{Config, ConfigStore, FileConfigStore},
    display::BoardView,
    game::{KeyOutcome, SpeedTest},
    highscore::{HighscoreStore, SqliteHighscoreStore, HIGHSCORE_KEY},
    error::{SprintError, SprintResult},
    letters::{normalize_locale, preferred_locales},
    logging::init_file_logging,
    runtime::{command_for, Command, CrosstermEventSource, FixedTicker, GameEvent, Runner},
};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::{Duration, Instant},
};
use tracing::{info, warn};

/// type the alphabet as fast as you can
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Type every letter of the alphabet, in order, as fast as you can. The timer starts on the first letter and your personal best is kept between sessions."
)]
pub struct Cli {
    /// locale to pick the letter set from (e.g. en, nb, nn, no); defaults to the system locale
    #[clap(short = 'l', long)]
    locale: Option<String>,

    /// path of the highscore database
    #[clap(long)]
    db: Option<PathBuf>,

    /// play without loading or saving a personal best
    #[clap(long)]
    no_store: bool,

    /// forget the saved personal best and exit
    #[clap(long)]
    reset_best: bool,
}

impl Cli {
    /// Locale preference list: explicit choices first, then the environment
    fn preferences(&self, config: &Config) -> Vec<String> {
        let mut prefs: Vec<String> = self
            .locale
            .iter()
            .chain(config.locale.iter())
            .filter_map(|l| normalize_locale(l))
            .collect();
        prefs.extend(preferred_locales());
        prefs
    }

    fn open_store(&self) -> Option<Box<dyn HighscoreStore>> {
        if self.no_store {
            return None;
        }

        let opened = match &self.db {
            Some(path) => SqliteHighscoreStore::open(path),
            None => SqliteHighscoreStore::open_default(),
        };

        match opened {
            Ok(store) => Some(Box::new(store) as Box<dyn HighscoreStore>),
            Err(e) => {
                warn!("highscore store unavailable: {e}");
                None
            }
        }
    }
}

pub struct App {
    pub game: SpeedTest<BoardView, SystemClock>,
    pub config: Config,
}

impl App {
    pub fn new(cli: &Cli, config: Config) -> Self {
        let display = BoardView::new(Duration::from_millis(config.flash_ms));
        let game = SpeedTest::new(
            display,
            SystemClock,
            cli.open_store(),
            cli.preferences(&config),
        );

        Self { game, config }
    }

    /// Apply one command. Returns false when the app should quit.
    pub fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => return false,
            Command::Restart => self.game.restart(),
            Command::Key(key) => {
                if let KeyOutcome::Finished(secs) = self.game.handle_key(&key) {
                    info!("finished in {secs:.2}s");
                }
            }
            Command::Ignore => {}
        }
        true
    }

    /// Clear expired flashes. Returns true if the screen needs a redraw.
    pub fn on_tick(&mut self) -> bool {
        let view = self.game.display_mut();
        let had_flash = view.has_active_flash();
        view.expire_flashes(Instant::now()) || had_flash
    }
}

fn reset_best(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let mut store = match &cli.db {
        Some(path) => SqliteHighscoreStore::open(path)?,
        None => SqliteHighscoreStore::open_default()?,
    };
    match store.updated_at(HIGHSCORE_KEY)? {
        Some(set_at) => {
            store.remove(HIGHSCORE_KEY)?;
            println!("personal best cleared (set {set_at})");
        }
        None => println!("no personal best saved"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Some(log_path) = AppDirs::log_path() {
        // Logging is best effort; the game runs the same without it
        let _ = init_file_logging(&log_path);
    }

    if cli.reset_best {
        return reset_best(&cli);
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let config = FileConfigStore::new().load();

    let mut terminal = setup_terminal()?;

    let mut app = App::new(&cli, config);
    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    result
}

fn setup_terminal() -> SprintResult<Terminal<CrosstermBackend<io::Stdout>>> {
    let terminal_err = |e: io::Error| SprintError::Terminal(e.to_string());

    enable_raw_mode().map_err(terminal_err)?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).map_err(terminal_err)?;
    Terminal::new(CrosstermBackend::new(stdout)).map_err(terminal_err)
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let ticker = FixedTicker::new(Duration::from_millis(app.config.tick_rate_ms.max(1)));
    let runner = Runner::new(CrosstermEventSource::new(), ticker);

    terminal.draw(|f| ui(app, f))?;

    loop {
        match runner.step() {
            GameEvent::Tick => {
                if app.on_tick() {
                    terminal.draw(|f| ui(app, f))?;
                }
            }
            GameEvent::Resize => {
                terminal.draw(|f| ui(app, f))?;
            }
            GameEvent::Key(key) => {
                if !app.on_command(command_for(&key)) {
                    break;
                }
                terminal.draw(|f| ui(app, f))?;
            }
        }
    }

    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app.game.display(), f.area());
}
