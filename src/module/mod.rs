//! The interpreter module: a compiled single-entry-point program together with
//! the process-wide state it runs against.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    InterpreterModule                         │
//! │                                                              │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────────┐   │
//! │  │  VirtualFs  │   │ stdout/stderr│   │ Box<dyn Program> │   │
//! │  │ (input data)│   │ (StdStream)  │   │  main(args)      │   │
//! │  └─────────────┘   └──────────────┘   └──────────────────┘   │
//! │         ▲                  │                                 │
//! │         │ write            │ drain + reopen                  │
//! └─────────┼──────────────────┼─────────────────────────────────┘
//!           │                  ▼
//!        io::VirtualIo  (only through the gateway)
//! ```
//!
//! All of this state is global to the module, not per request. The program
//! closes both std handles when `main` returns, mirroring a process exit.

mod fs;
pub mod loader;
mod stream;

pub use fs::{FsError, VirtualFs};
pub use loader::{Bootstrap, LoadError, LoadState, ModuleLoader, ReadyHandle};
pub use stream::StdStream;

use parking_lot::Mutex;
use std::{fmt, sync::Arc};

/// Module shared between the loader (owner) and the gateway's channel.
pub type SharedModule = Arc<Mutex<InterpreterModule>>;

/// What the program sees while its entry point runs.
pub struct ProgramEnv<'a> {
    pub fs: &'a VirtualFs,
    pub stdout: &'a mut StdStream,
    pub stderr: &'a mut StdStream,
}

/// A compiled program with a single entry point.
///
/// `main` runs to completion before returning and reports an exit status;
/// errors are the program's business and go to `env.stderr`.
pub trait Program: Send {
    fn name(&self) -> &str;

    fn main(&mut self, args: &[String], env: &mut ProgramEnv<'_>) -> i32;
}

/// A loaded program plus its private filesystem and std handles.
pub struct InterpreterModule {
    program: Box<dyn Program>,
    fs: VirtualFs,
    stdout: StdStream,
    stderr: StdStream,
    /// Completed entry-point calls
    calls: u64,
}

impl InterpreterModule {
    pub fn new(program: Box<dyn Program>, fs: VirtualFs) -> Self {
        Self {
            program,
            fs,
            stdout: StdStream::new("stdout"),
            stderr: StdStream::new("stderr"),
            calls: 0,
        }
    }

    /// Wrap into the shared handle handed out by the loader.
    pub fn into_shared(self) -> SharedModule {
        Arc::new(Mutex::new(self))
    }

    pub fn program_name(&self) -> &str {
        self.program.name()
    }

    pub fn fs(&self) -> &VirtualFs {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut VirtualFs {
        &mut self.fs
    }

    pub fn stdout_mut(&mut self) -> &mut StdStream {
        &mut self.stdout
    }

    pub fn stderr_mut(&mut self) -> &mut StdStream {
        &mut self.stderr
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Call the entry point. On return both std handles are closed.
    pub fn call_main(&mut self, args: &[String]) -> i32 {
        let mut env = ProgramEnv {
            fs: &self.fs,
            stdout: &mut self.stdout,
            stderr: &mut self.stderr,
        };
        let code = self.program.main(args, &mut env);

        self.stdout.close();
        self.stderr.close();
        self.calls += 1;
        code
    }

    /// Reopen the std handles closed by the last `call_main`.
    pub fn reopen_std_streams(&mut self) {
        self.stdout.reopen();
        self.stderr.reopen();
    }
}

impl fmt::Debug for InterpreterModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterModule")
            .field("program", &self.program.name())
            .field("files", &self.fs.len())
            .field("calls", &self.calls)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Small programs used by tests across the crate.

    use super::{Program, ProgramEnv};
    use std::path::Path;

    /// Prints its arguments, then the content of the file named by the last one.
    pub struct Echo;

    impl Program for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn main(&mut self, args: &[String], env: &mut ProgramEnv<'_>) -> i32 {
            env.stdout.writeln(&format!("args: {}", args.join(" ")));
            match args.last().map(|path| env.fs.read_to_string(Path::new(path))) {
                Some(Ok(text)) => {
                    env.stdout.writeln(&text);
                    0
                }
                Some(Err(err)) => {
                    env.stderr.writeln(&format!("echo: {err}"));
                    2
                }
                None => 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Echo;
    use super::*;
    use std::path::Path;

    #[test]
    fn test_call_main_closes_streams() {
        let mut module = InterpreterModule::new(Box::new(Echo), VirtualFs::new());
        module.fs_mut().write(Path::new("/in"), b"hello").unwrap();

        let code = module.call_main(&["/in".to_string()]);
        assert_eq!(code, 0);
        assert!(!module.stdout_mut().is_open());
        assert!(!module.stderr_mut().is_open());
        assert_eq!(module.stdout_mut().drain(), "args: /in\nhello");
        assert_eq!(module.calls(), 1);
    }

    #[test]
    fn test_output_lost_without_reopen() {
        let mut module = InterpreterModule::new(Box::new(Echo), VirtualFs::new());
        module.call_main(&[]);
        module.stdout_mut().drain();

        module.call_main(&[]);
        assert_eq!(module.stdout_mut().drain(), "");

        module.reopen_std_streams();
        module.call_main(&[]);
        assert_eq!(module.stdout_mut().drain(), "args: ");
    }

    #[test]
    fn test_debug_shows_program() {
        let module = InterpreterModule::new(Box::new(Echo), VirtualFs::new());
        let debug = format!("{module:?}");
        assert!(debug.contains("echo"));
    }
}
