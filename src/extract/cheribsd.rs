//! CheriBSD backend.
//!
//! Implements the `Extractor` trait for CheriBSD kernels. Both hybrid and
//! purecap kernels use the arm64 machine headers.

use super::{Arch, ConstExtract, ConstInfo, Consts, ExtractParams, Extractor, Undeclared};
use crate::error::{Error, Result};
use crate::utils::split_list;
use std::os::unix::fs::symlink;
use std::path::{self, Path};

/// Machine header directory linked into every build directory.
const MACHINE_ARCH: &str = "arm64";

const DEFINES: &[&str] = &[
    "-DGENOFFSET",
    "-D_KERNEL",
    "-D__BSD_VISIBLE=1",
    "-DCOMPAT_FREEBSD13",
    "-DCOMPAT_FREEBSD14",
];

/// The CheriBSD backend, delegating compilation to `E`.
pub struct CheriBsd<E: ConstExtract> {
    extract: E,
}

impl<E: ConstExtract> CheriBsd<E> {
    pub fn new(extract: E) -> Self {
        Self { extract }
    }

    /// Compiler arguments used for every file of `arch`.
    pub fn compiler_args(arch: &Arch, info: &ConstInfo) -> Vec<String> {
        let src = &arch.source_dir;
        let mut args: Vec<String> = vec!["-fmessage-length=0".into(), "-nostdinc".into()];
        args.extend(DEFINES.iter().map(|define| define.to_string()));
        for dir in [
            src.join("sys"),
            src.join("sys").join("sys"),
            src.join("sys").join("contrib").join("ck").join("include"),
            src.join("include"),
            arch.build_dir.clone(),
        ] {
            args.push("-I".into());
            args.push(dir.display().to_string());
        }
        for incdir in &info.incdirs {
            args.push(format!("-I{}", src.join(incdir).display()));
        }
        for dir in split_list(&arch.include_dirs) {
            args.push(format!("-I{dir}"));
        }
        args.extend(arch.target.cflags.iter().cloned());
        args
    }
}

impl<E: ConstExtract> Extractor for CheriBsd<E> {
    fn prepare(&self, _source_dir: &Path, build: bool, _arches: &[Arch]) -> Result<()> {
        if !build {
            return Err(Error::Config("cheribsd requires -build flag".into()));
        }
        Ok(())
    }

    fn prepare_arch(&self, arch: &Arch) -> Result<()> {
        let include_dir = arch.source_dir.join("sys").join(MACHINE_ARCH).join("include");
        let include_dir = path::absolute(&include_dir)
            .map_err(|err| Error::Config(format!("failed to get absolute source path: {err}")))?;
        symlink(&include_dir, arch.build_dir.join("machine"))
            .map_err(|err| Error::Config(format!("failed to create link: {err}")))?;
        tracing::debug!(arch = %arch.name, target = %include_dir.display(), "linked machine headers");
        Ok(())
    }

    fn process_file(&self, arch: &Arch, info: &ConstInfo) -> Result<(Consts, Undeclared)> {
        let args = Self::compiler_args(arch, info);
        let params = ExtractParams {
            add_source: "#include <sys/syscall.h>".into(),
            declare_printf: true,
            extract_from_elf: true,
            target_endian: arch.target.host_endian,
        };
        tracing::debug!(file = %info.file, args = args.len(), "extracting constants");
        self.extract.extract(info, &arch.target.c_compiler, &args, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Target;
    use object::Endianness;
    use std::cell::RefCell;
    use std::path::PathBuf;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(String, Vec<String>, ExtractParams)>>,
    }

    impl ConstExtract for &Recorder {
        fn extract(
            &self,
            _info: &ConstInfo,
            cc: &str,
            args: &[String],
            params: &ExtractParams,
        ) -> Result<(Consts, Undeclared)> {
            self.calls.borrow_mut().push((cc.to_string(), args.to_vec(), params.clone()));
            let mut consts = Consts::new();
            consts.insert("SYS_read".into(), 3);
            Ok((consts, Undeclared::new()))
        }
    }

    fn arch(source: &str, build: PathBuf) -> Arch {
        Arch {
            name: "arm64".into(),
            source_dir: PathBuf::from(source),
            build_dir: build,
            include_dirs: "/opt/extra,/opt/more".into(),
            target: Target {
                c_compiler: "clang".into(),
                cflags: vec!["-march=morello".into()],
                host_endian: Endianness::default(),
            },
        }
    }

    #[test]
    fn prepare_requires_build() {
        let recorder = Recorder::default();
        let backend = CheriBsd::new(&recorder);
        let err = backend.prepare(Path::new("/src"), false, &[]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
        assert!(backend.prepare(Path::new("/src"), true, &[]).is_ok());
    }

    #[test]
    fn process_file_assembles_flags_in_order() {
        let recorder = Recorder::default();
        let backend = CheriBsd::new(&recorder);
        let info = ConstInfo {
            file: "sys.txt".into(),
            incdirs: vec!["sys/dev".into()],
            ..ConstInfo::default()
        };
        let (consts, undeclared) = backend
            .process_file(&arch("/cheribsd", PathBuf::from("/build/arm64")), &info)
            .unwrap();
        assert_eq!(consts.get("SYS_read"), Some(&3));
        assert!(undeclared.is_empty());

        let calls = recorder.calls.borrow();
        let (cc, args, params) = &calls[0];
        assert_eq!(cc, "clang");
        let expected: Vec<String> = [
            "-fmessage-length=0",
            "-nostdinc",
            "-DGENOFFSET",
            "-D_KERNEL",
            "-D__BSD_VISIBLE=1",
            "-DCOMPAT_FREEBSD13",
            "-DCOMPAT_FREEBSD14",
            "-I",
            "/cheribsd/sys",
            "-I",
            "/cheribsd/sys/sys",
            "-I",
            "/cheribsd/sys/contrib/ck/include",
            "-I",
            "/cheribsd/include",
            "-I",
            "/build/arm64",
            "-I/cheribsd/sys/dev",
            "-I/opt/extra",
            "-I/opt/more",
            "-march=morello",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect();
        assert_eq!(args, &expected);
        assert_eq!(params.add_source, "#include <sys/syscall.h>");
        assert!(params.declare_printf);
        assert!(params.extract_from_elf);
        assert_eq!(params.target_endian, Endianness::default());
    }

    #[test]
    fn prepare_arch_links_machine_headers() {
        let root = std::env::temp_dir().join(format!("kstructs-cheribsd-{}", std::process::id()));
        let build = root.join("build");
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&build).unwrap();

        let recorder = Recorder::default();
        let backend = CheriBsd::new(&recorder);
        let arch = arch(root.join("src").to_str().unwrap(), build.clone());
        backend.prepare_arch(&arch).unwrap();

        let link = std::fs::read_link(build.join("machine")).unwrap();
        assert_eq!(link, root.join("src").join("sys").join("arm64").join("include"));

        // A second link with the same name is a configuration error.
        let err = backend.prepare_arch(&arch).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
        std::fs::remove_dir_all(&root).unwrap();
    }
}
